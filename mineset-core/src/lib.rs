//! # Mineset Core
//!
//! Keeps the durable set of configured miners and the live mining connections
//! in step with it.
//!
//! ## Components
//!
//! - [`MinerRegistry`]: authoritative miner set, persisted after every change
//! - [`ConnectionPool`]: at most one live connection per miner
//! - [`Orchestrator`]: opens and closes connections until the pool matches the
//!   miners that are on with a ready plot
//! - [`BalancePoller`]: refreshes balances over the live connections
//! - [`MiningService`]: background worker driving all of the above from commands
//!   and timers

pub mod config;
pub mod error;
pub mod keys;
pub mod model;
pub mod orchestrator;
pub mod plot;
pub mod poller;
pub mod pool;
pub mod record;
pub mod registry;
pub mod service;
pub mod store;

// Re-export main types
pub use config::ServiceConfig;
pub use error::{CoreError, Result, ValidationError};
pub use keys::{IdentityMaterial, KeyProvider};
pub use model::{Miner, MinerStatus, MiningSpecification, PublicKey};
pub use orchestrator::{ConnectionEvent, Orchestrator, ReconcileReport};
pub use plot::{plot_path, Plot, PlotEngine, ProgressCallback, Prolog};
pub use poller::{BalancePoller, PollReport};
pub use pool::ConnectionPool;
pub use record::MinerRecord;
pub use registry::{LoadPolicy, MinerEntry, MinerRegistry, RegistryEvent, RegistrySnapshot};
pub use service::{MiningService, PendingMiner, ServiceEvent, ServiceHandle};
pub use store::{FileStore, MemoryStore, RegistryStore};
