pub mod commands;
pub mod config;
pub mod lock;
pub mod plotter;

// Re-export commonly used types
pub use config::{CliConfig, PlotterConfig};
pub use lock::RegistryLock;
pub use plotter::ExternalPlotter;
