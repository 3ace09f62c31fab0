use mineset_remote::RemoteError;
use thiserror::Error;
use uuid::Uuid;

/// Input rejected at the command boundary; never reaches the registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Plot size must be at least 1 nonce, got {0}")]
    NonPositiveSize(i64),

    #[error("Malformed endpoint URI: {0}")]
    MalformedUri(String),

    #[error("Malformed base58 key: {0}")]
    MalformedKey(String),

    #[error("Mining specification has no name")]
    EmptySpecificationName,

    #[error("Key derivation requested but no key provider is configured")]
    MissingKeyProvider,
}

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The durable store could not be read or written
    #[error("Persistence failure: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("Timeout accessing the durable store")]
    PersistenceTimeout,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed persisted record #{index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("Unknown miner: {0}")]
    UnknownMiner(Uuid),

    #[error("Plot error: {0}")]
    Plot(String),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Mining service stopped")]
    ServiceStopped,
}

impl CoreError {
    /// True for failures of the durable store, whose mutation is not yet durable
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            CoreError::Persistence(_) | CoreError::PersistenceTimeout | CoreError::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
