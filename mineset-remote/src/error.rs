use thiserror::Error;

/// Errors raised while talking to a remote mining endpoint
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The operation did not complete within its deadline; always retryable
    #[error("Timeout waiting for remote endpoint")]
    Timeout,

    #[error("Connection closed")]
    Closed,

    /// The endpoint could not be reached or refused the handshake
    #[error("Deployment failed: {0}")]
    Deployment(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote error: {code} - {message}")]
    Rpc { code: i32, message: String },

    #[error("Invalid endpoint URI: {0}")]
    InvalidUri(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Transient errors are dealt with by dropping the connection and retrying later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Timeout | RemoteError::Closed | RemoteError::Deployment(_) | RemoteError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
