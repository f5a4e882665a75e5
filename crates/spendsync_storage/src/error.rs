//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key is empty or contains characters that are not allowed.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// The store refused the write.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
