//! Error types for account store operations.

use kvident_kv::KvError;
use thiserror::Error;

/// Errors that can occur during account store operations.
///
/// A lookup that finds nothing is not an error: find operations return
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store handle was disposed before this call.
    #[error("account store is disposed")]
    Disposed,

    /// A required argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The key-value backend failed. Propagated unchanged.
    #[error("backend error: {0}")]
    Backend(#[from] KvError),

    /// A stored record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience type alias for account store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
