use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::registry::LoadPolicy;

/// Mining service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// File holding the miner registry
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Directory holding one plot file per miner
    #[serde(default = "default_plots_dir")]
    pub plots_dir: PathBuf,

    /// Handling of unparsable persisted records
    #[serde(default)]
    pub load_policy: LoadPolicy,

    /// Period of the reconciliation timer, seconds
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// Period of balance polling while enabled, seconds
    #[serde(default = "default_balance_interval_secs")]
    pub balance_interval_secs: u64,

    /// Upper bound for opening a connection, seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Upper bound for a balance request, seconds
    #[serde(default = "default_balance_timeout_secs")]
    pub balance_timeout_secs: u64,

    /// Upper bound for reading or writing the registry file, seconds
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,

    /// Capacity of the command queue of the worker
    #[serde(default = "default_command_queue_size")]
    pub command_queue_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            plots_dir: default_plots_dir(),
            load_policy: LoadPolicy::default(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            balance_interval_secs: default_balance_interval_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            balance_timeout_secs: default_balance_timeout_secs(),
            store_timeout_secs: default_store_timeout_secs(),
            command_queue_size: default_command_queue_size(),
        }
    }
}

impl ServiceConfig {
    /// Keep registry and plots under one directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            store_path: dir.join("miners.json"),
            plots_dir: dir.join("plots"),
            ..Default::default()
        }
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }

    pub fn balance_interval(&self) -> Duration {
        Duration::from_secs(self.balance_interval_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn balance_timeout(&self) -> Duration {
        Duration::from_secs(self.balance_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

// Default value functions for serde
fn default_store_path() -> PathBuf { PathBuf::from("miners.json") }
fn default_plots_dir() -> PathBuf { PathBuf::from("plots") }
fn default_reconcile_interval_secs() -> u64 { 600 }
fn default_balance_interval_secs() -> u64 { 60 }
fn default_connect_timeout_secs() -> u64 { 30 }
fn default_balance_timeout_secs() -> u64 { 10 }
fn default_store_timeout_secs() -> u64 { 10 }
fn default_command_queue_size() -> usize { 64 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.reconcile_interval(), Duration::from_secs(600));
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.load_policy, LoadPolicy::SkipMalformed);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ServiceConfig = serde_json::from_str(r#"{"load_policy": "strict"}"#).unwrap();
        assert_eq!(config.load_policy, LoadPolicy::Strict);
        assert_eq!(config.balance_interval_secs, 60);
    }
}
