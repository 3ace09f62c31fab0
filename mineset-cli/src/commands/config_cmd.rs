use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use colored::*;

use crate::config::{config_exists, get_config_path, load_config, save_config, CliConfig};

/// Configuration management
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a configuration file with the defaults
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn execute(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = load_config()?;
            if !config_exists() {
                println!("{}", "# defaults, no configuration file".bright_black());
            }
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigCommand::Path => println!("{}", get_config_path().display()),
        ConfigCommand::Init { force } => {
            let path = get_config_path();
            if config_exists() && !force {
                return Err(anyhow!(
                    "{} already exists, use --force to overwrite it",
                    path.display()
                ));
            }
            save_config(&CliConfig::default())?;
            println!("{}", format!("✓ Configuration written to {}", path.display()).green());
        }
    }
    Ok(())
}
