//! Error types for the store contract.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by a key-value store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested key is not present in the store.
    #[error("key not found")]
    KeyNotFound,

    /// A write constraint rejected the entry because a live (non-tombstoned)
    /// value already exists under the key.
    #[error("key already exists")]
    KeyAlreadyExists,

    /// A `MustExist` constraint rejected the entry because no value exists
    /// under the key.
    #[error("key must exist")]
    KeyMustExist,

    /// The snapshot or reader has already been closed.
    #[error("already closed")]
    AlreadyClosed,

    /// An empty or otherwise malformed batch was submitted for commit.
    #[error("illegal arguments: {0}")]
    IllegalArguments(&'static str),
}
