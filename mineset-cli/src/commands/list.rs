use anyhow::Result;
use chrono::Local;
use clap::Args;
use colored::*;
use console::style;
use mineset_core::{MinerEntry, MinerRecord};
use tabled::{settings::Style, Table, Tabled};

use super::{open_registry, short_id};
use crate::config::load_config;

/// List configured miners
#[derive(Args)]
pub struct ListArgs {
    /// Output the persisted records as JSON
    #[arg(short, long)]
    json: bool,

    /// Show full miner ids
    #[arg(short, long)]
    long: bool,
}

#[derive(Tabled)]
struct MinerRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Chain")]
    chain: String,
    #[tabled(rename = "Endpoint")]
    uri: String,
    #[tabled(rename = "Nonces")]
    size: u64,
    #[tabled(rename = "Balance")]
    balance: String,
    #[tabled(rename = "Plot")]
    plot: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl MinerRow {
    fn new(entry: &MinerEntry, long: bool) -> Self {
        let id = entry.miner.id();
        let status = &entry.status;

        Self {
            id: if long { id.to_string() } else { short_id(id) },
            chain: entry.miner.specification().name.clone(),
            uri: entry.miner.uri().to_string(),
            size: entry.miner.size(),
            balance: status.balance.to_string(),
            plot: if status.has_plot_ready {
                "ready".green().to_string()
            } else {
                "plotting".yellow().to_string()
            },
            state: if status.is_on {
                "on".green().bold().to_string()
            } else {
                "off".bright_black().to_string()
            },
            updated: status
                .last_updated
                .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string()),
        }
    }
}

pub async fn execute(args: ListArgs) -> Result<()> {
    let config = load_config()?;
    let registry = open_registry(&config).await?;
    let snapshot = registry.snapshot();

    if args.json {
        let records: Vec<MinerRecord> = snapshot
            .iter()
            .map(|entry| MinerRecord::new(&entry.miner, &entry.status))
            .collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if snapshot.is_empty() {
        println!("{}", "No miners configured".yellow());
        println!();
        println!("Create one with:");
        println!(
            "  {} {}",
            style("$").dim(),
            "mineset create --uri ws://host:8025 --size 1000 --deadline-key <base58>".bold()
        );
        return Ok(());
    }

    let rows: Vec<MinerRow> = snapshot.iter().map(|entry| MinerRow::new(entry, args.long)).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);

    let on = snapshot.iter().filter(|entry| entry.status.is_on).count();
    println!(
        "{} miners, {} on, {} ready to mine",
        snapshot.len(),
        on.to_string().green(),
        snapshot.desired().count().to_string().cyan()
    );
    Ok(())
}
