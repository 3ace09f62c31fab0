use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::*;
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use mineset_core::{IdentityMaterial, ServiceEvent, ServiceHandle};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::{lock_registry, short_id, start_service};
use crate::config::load_config;

/// Create a miner for a remote endpoint and plot it
#[derive(Args)]
pub struct CreateArgs {
    /// Mining endpoint (e.g., ws://node.example.com:8025)
    #[arg(short, long)]
    pub uri: String,

    /// Plot size, in nonces
    #[arg(short, long, allow_negative_numbers = true)]
    pub size: i64,

    /// Base58 public key used for signing deadlines
    #[arg(short = 'k', long)]
    pub deadline_key: String,

    /// Start plotting without confirmation
    #[arg(short, long)]
    pub yes: bool,
}

pub async fn execute(args: CreateArgs) -> Result<()> {
    let config = load_config()?;
    if config.plotter.is_none() {
        return Err(anyhow!(
            "No plotter configured. Add a [plotter] section to the configuration file."
        ));
    }

    let _lock = lock_registry(&config)?;
    let service = start_service(&config, false).await?;
    let result = create(&service, args).await;
    service.shutdown().await?;
    result
}

async fn create(service: &ServiceHandle, args: CreateArgs) -> Result<()> {
    let pending = service
        .create_miner(&args.uri, args.size, IdentityMaterial::PublicKey(args.deadline_key))
        .await
        .context("Cannot create miner")?;

    let miner = pending.miner();
    let spec = miner.specification();
    println!("{}", "Endpoint specification:".bold());
    println!("  Name: {}", spec.name.yellow());
    if !spec.description.is_empty() {
        println!("  Description: {}", spec.description);
    }
    println!("  Chain: {}", spec.chain_id.cyan());
    println!("  Hashing: {}", spec.hashing_for_deadlines);
    println!("  Signatures: {} (blocks), {} (deadlines)", spec.signature_for_blocks, spec.signature_for_deadlines);
    println!("  Nonces: {}", miner.size());
    println!();

    if !args.yes {
        let confirm = Confirm::new()
            .with_prompt("Create the plot for this miner?")
            .default(true)
            .interact()?;

        if !confirm {
            println!("{}", "Cancelled".yellow());
            return Ok(());
        }
    }

    let id = miner.id();
    let mut events = service.subscribe();
    service.confirm_plot_creation(pending).await?;

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_message(format!("Plotting miner {}", short_id(id)));

    wait_for_plot(&mut events, id, &pb).await?;
    pb.finish_and_clear();

    println!("{} Miner {} created", "✓".green(), id.to_string().bold());
    println!();
    println!("{}", style("Start mining with:").dim());
    println!("  {} {}", style("$").dim(), "mineset run".bold());
    Ok(())
}

async fn wait_for_plot(
    events: &mut tokio::sync::broadcast::Receiver<ServiceEvent>,
    id: Uuid,
    pb: &ProgressBar,
) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(ServiceEvent::PlotProgress { id: plotting, percent }) if plotting == id => {
                pb.set_position(u64::from(percent));
            }
            Ok(ServiceEvent::PlotCreated(created)) if created == id => return Ok(()),
            Ok(ServiceEvent::PlotFailed { id: failed, reason }) if failed == id => {
                pb.abandon();
                return Err(anyhow!("Plot creation failed: {}", reason));
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => return Err(anyhow!("Mining service stopped while plotting")),
        }
    }
}
