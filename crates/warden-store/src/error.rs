//! Store error types.

use thiserror::Error;
use warden_storage::StorageError;

/// Errors produced by the table layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying storage backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A stored row could not be interpreted.
    #[error("corrupt row in {table}: {detail}")]
    Corrupt {
        /// The table the row belongs to.
        table: &'static str,
        /// What went wrong.
        detail: String,
    },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
