use anyhow::Result;
use chrono::Local;
use clap::Args;
use colored::*;
use console::style;
use mineset_core::{ConnectionEvent, RegistryEvent, ServiceEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::{lock_registry, short_id, start_service};
use crate::config::load_config;

/// Keep mining with every miner that is on, until interrupted
#[derive(Args)]
pub struct RunArgs {
    /// Poll balances periodically
    #[arg(short, long)]
    pub poll_balances: bool,

    /// Override the balance polling period, seconds
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Override the reconciliation period, seconds
    #[arg(long)]
    pub reconcile_interval: Option<u64>,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let mut config = load_config()?;
    if let Some(secs) = args.poll_interval {
        config.service.balance_interval_secs = secs;
    }
    if let Some(secs) = args.reconcile_interval {
        config.service.reconcile_interval_secs = secs;
    }

    let _lock = lock_registry(&config)?;
    let service = start_service(&config, true).await?;
    let mut events = service.subscribe();
    service.set_balance_polling(args.poll_balances).await?;

    let snapshot = service.snapshot();
    println!(
        "{} {} | {} miners, {} ready to mine",
        "Mineset".bold().cyan(),
        style(env!("CARGO_PKG_VERSION")).dim(),
        snapshot.len(),
        snapshot.desired().count()
    );
    println!("{}", style("Press Ctrl+C to stop").dim());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(line) = describe(&event) {
                        println!("{} {}", style(Local::now().format("%H:%M:%S")).dim(), line);
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!("Missed {} service events", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    println!("{}", "Stopping...".yellow());
    service.shutdown().await?;
    println!("{}", "✓ Stopped".green());
    Ok(())
}

fn describe(event: &ServiceEvent) -> Option<String> {
    let line = match event {
        ServiceEvent::Connection(ConnectionEvent::Connected(id)) => {
            format!("{} miner {} is mining", "▲".green(), short_id(*id))
        }
        ServiceEvent::Connection(ConnectionEvent::Disconnected(id)) => {
            format!("{} miner {} disconnected", "▼".yellow(), short_id(*id))
        }
        ServiceEvent::Connection(ConnectionEvent::ConnectFailed { id, reason }) => {
            format!("{} miner {} cannot connect: {}", "✗".red(), short_id(*id), reason)
        }
        ServiceEvent::Registry(RegistryEvent::BalanceUpdated { id, balance }) => {
            format!("{} miner {} balance {}", "◆".cyan(), short_id(*id), balance.to_string().bold())
        }
        ServiceEvent::Registry(RegistryEvent::Switched { id, on }) => {
            format!("miner {} turned {}", short_id(*id), if *on { "on" } else { "off" })
        }
        ServiceEvent::PlotCreated(id) => format!("{} plot of miner {} is ready", "✓".green(), short_id(*id)),
        ServiceEvent::PlotFailed { id, reason } => {
            format!("{} plot of miner {} failed: {}", "✗".red(), short_id(*id), reason)
        }
        _ => return None,
    };
    Some(line)
}
