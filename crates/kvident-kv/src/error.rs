//! Error types for key-value backend operations.

use thiserror::Error;

/// Errors surfaced by a [`KvBackend`](crate::KvBackend).
#[derive(Debug, Error)]
pub enum KvError {
    /// `increment` was called on a key whose value is not an integer.
    #[error("value at {key} is not an integer")]
    NotAnInteger { key: String },

    /// Serialization or deserialization of backend state failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An internal lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// I/O error from a file-backed store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for backend operations.
pub type KvResult<T> = std::result::Result<T, KvError>;
