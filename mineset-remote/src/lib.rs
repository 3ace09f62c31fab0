//! Mineset Remote Mining Client
//!
//! Connection handling for remote proof-of-space mining endpoints.
//!
//! # Features
//!
//! - `MiningConnection` and `Connector` traits consumed by the mining orchestrator
//! - JSON-lines over TCP reference transport
//! - Exactly-once close notifications, also for late registrations
//! - Bounded timeouts on every exchange, reported as a distinct error kind
//!
//! # Example
//!
//! ```no_run
//! use mineset_remote::{Connector, MinerIdentity, MiningConnection, RemoteConfig, TcpConnector};
//! use std::{path::PathBuf, time::Duration};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = TcpConnector::new(RemoteConfig::default());
//!     let identity = MinerIdentity {
//!         miner_id: uuid::Uuid::new_v4(),
//!         public_key_base58: "3yZe7d".to_string(),
//!         signature_for_deadlines: "ed25519".to_string(),
//!         plot_path: PathBuf::from("miner.plot"),
//!     };
//!
//!     let connection = connector
//!         .connect(&identity, "ws://localhost:8025", Duration::from_secs(30))
//!         .await?;
//!     connection.on_close(Box::new(|| println!("connection lost")));
//!
//!     let balance = connection
//!         .get_balance("ed25519", &identity.public_key_base58, Duration::from_secs(10))
//!         .await?;
//!     println!("Balance: {:?}", balance);
//!
//!     connection.close().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;

// Re-export main types
pub use client::{TcpConnection, TcpConnector};
pub use config::{Endpoint, RemoteConfig, DEFAULT_MINING_PORT};
pub use connection::{CloseCallback, CloseNotifier, Connector, MinerIdentity, MiningConnection};
pub use error::{RemoteError, Result};
pub use protocol::SpecificationPayload;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
