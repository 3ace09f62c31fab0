use anyhow::Result;
use clap::{Parser, Subcommand};

use mineset_cli::commands::*;
use mineset_cli::config;

/// Mineset - proof-of-space miner registry and mining worker
#[derive(Parser)]
#[command(name = "mineset")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose mode (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file path
    #[arg(short, long, global = true, env = "MINESET_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured miners
    List(list::ListArgs),

    /// Create a miner for a remote endpoint and plot it
    Create(create::CreateArgs),

    /// Delete a miner and its plot
    Remove(remove::RemoveArgs),

    /// Turn a miner on
    On(switch::SwitchArgs),

    /// Turn a miner off
    Off(switch::SwitchArgs),

    /// Keep mining with every miner that is on, until interrupted
    Run(run::RunArgs),

    /// Configuration management
    Config(config_cmd::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(cli.verbose > 1)
        .init();

    if let Some(config_path) = &cli.config {
        config::set_config_path(config_path);
    }

    match cli.command {
        Commands::List(args) => list::execute(args).await?,
        Commands::Create(args) => create::execute(args).await?,
        Commands::Remove(args) => remove::execute(args).await?,
        Commands::On(args) => switch::execute(args, true).await?,
        Commands::Off(args) => switch::execute(args, false).await?,
        Commands::Run(args) => run::execute(args).await?,
        Commands::Config(args) => config_cmd::execute(args).await?,
    }

    Ok(())
}
