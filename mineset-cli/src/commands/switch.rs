use anyhow::{anyhow, Result};
use clap::Args;
use colored::*;

use super::{lock_registry, open_registry, resolve_miner};
use crate::config::load_config;

/// Select a miner to turn on or off
#[derive(Args)]
pub struct SwitchArgs {
    /// Miner id, or an unambiguous prefix of it
    pub id: String,
}

pub async fn execute(args: SwitchArgs, on: bool) -> Result<()> {
    let config = load_config()?;
    let _lock = lock_registry(&config)?;
    let registry = open_registry(&config).await?;
    let id = resolve_miner(&registry.snapshot(), &args.id)?;
    let state = if on { "on" } else { "off" };

    let status = registry.status(id).ok_or_else(|| anyhow!("No miner {}", id))?;
    if !registry.set_on(id, on).await? {
        println!("{}", format!("ℹ Miner {} is already {}", id, state).blue());
        return Ok(());
    }

    println!("{}", format!("✓ Miner {} turned {}", id, state).green());
    if on && !status.has_plot_ready {
        println!("{}", "  Its plot is not ready yet; it will mine once plotting completes".yellow());
    }
    Ok(())
}
