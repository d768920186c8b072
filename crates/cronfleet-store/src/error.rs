//! Error types for the lease store.

use thiserror::Error;

/// Result type alias for lease store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the shared store.
///
/// Every variant means the same thing to the protocol: the store is
/// unavailable for this operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("store operation timed out: {0}")]
    Timeout(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

impl StoreError {
    /// Classify an I/O error, separating timeouts from other failures.
    pub fn from_io(op: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                StoreError::Timeout(format!("{op}: {err}"))
            }
            _ => StoreError::Io(err),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout(_))
    }
}
