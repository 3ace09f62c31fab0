use anyhow::Result;
use clap::Args;
use colored::*;
use dialoguer::Confirm;
use mineset_core::plot_path;
use std::path::Path;

use super::{lock_registry, open_registry, resolve_miner};
use crate::{config::load_config, plotter::manifest_path};

/// Delete a miner and its plot
#[derive(Args)]
pub struct RemoveArgs {
    /// Miner id, or an unambiguous prefix of it
    pub id: String,

    /// Delete without confirmation
    #[arg(short, long)]
    force: bool,
}

pub async fn execute(args: RemoveArgs) -> Result<()> {
    let config = load_config()?;
    let _lock = lock_registry(&config)?;
    let registry = open_registry(&config).await?;
    let id = resolve_miner(&registry.snapshot(), &args.id)?;

    let Some(miner) = registry.get(id) else {
        println!("{}", format!("⚠ No miner {}", id).yellow());
        return Ok(());
    };

    if !args.force {
        let confirm = Confirm::new()
            .with_prompt(format!("Delete miner {} and its plot?", miner))
            .default(false)
            .interact()?;

        if !confirm {
            println!("{}", "Cancelled".yellow());
            return Ok(());
        }
    }

    registry.remove(id).await?;

    let plot = plot_path(&config.service.plots_dir, id);
    remove_if_present(&plot).await?;
    remove_if_present(&manifest_path(&plot)).await?;

    println!("{}", format!("✓ Miner {} deleted", id).green());
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
