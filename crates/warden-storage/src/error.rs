//! Storage error types.

use thiserror::Error;

/// Errors produced by the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be opened.
    #[error("storage connection failed: {0}")]
    Connection(String),

    /// A namespace or key failed validation.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A value failed to serialize or deserialize.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The backend failed mid-operation.
    #[error("storage internal error: {0}")]
    Internal(String),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
