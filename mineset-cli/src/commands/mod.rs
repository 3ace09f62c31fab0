pub mod config_cmd;
pub mod create;
pub mod list;
pub mod remove;
pub mod run;
pub mod switch;

use anyhow::{anyhow, Context, Result};
use mineset_core::{FileStore, MinerRegistry, MiningService, RegistrySnapshot, ServiceHandle};
use mineset_remote::TcpConnector;
use std::sync::Arc;
use uuid::Uuid;

use crate::{config::CliConfig, lock::RegistryLock, plotter::ExternalPlotter};

/// Claim the configured registry; fails while another command writes it
pub fn lock_registry(config: &CliConfig) -> Result<RegistryLock> {
    RegistryLock::acquire(&config.service.store_path)
}

/// Registry backed by the configured store, already loaded
pub async fn open_registry(config: &CliConfig) -> Result<MinerRegistry> {
    let service = &config.service;
    let store = FileStore::new(service.store_path.clone(), service.store_timeout());
    let registry = MinerRegistry::new(Arc::new(store), service.load_policy);

    registry
        .load()
        .await
        .with_context(|| format!("Failed to load miners from {}", service.store_path.display()))?;
    Ok(registry)
}

/// Start the background worker over the TCP transport.
/// Without `mining` it only serves commands and never connects miners.
pub async fn start_service(config: &CliConfig, mining: bool) -> Result<ServiceHandle> {
    let connector = Arc::new(TcpConnector::new(config.remote.clone()));
    let mut service = MiningService::new(config.service.clone(), connector);

    if let Some(plotter) = &config.plotter {
        service = service.with_plot_engine(Arc::new(ExternalPlotter::new(plotter.clone())));
    }
    if !mining {
        service = service.without_reconciliation();
    }

    service.spawn().await.context("Failed to start the mining service")
}

/// Accept a full miner id or an unambiguous prefix of one
pub fn resolve_miner(snapshot: &RegistrySnapshot, text: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(text) {
        return Ok(id);
    }

    let prefix = text.to_ascii_lowercase();
    let mut matches = snapshot
        .iter()
        .map(|entry| entry.miner.id())
        .filter(|id| id.to_string().starts_with(&prefix));

    match (matches.next(), matches.next()) {
        (Some(id), None) => Ok(id),
        (Some(_), Some(_)) => Err(anyhow!("'{}' matches more than one miner", text)),
        (None, _) => Err(anyhow!("No miner matches '{}'", text)),
    }
}

/// First block of a miner id, enough to tell miners apart in tables
pub fn short_id(id: Uuid) -> String {
    id.to_string().chars().take(8).collect()
}
