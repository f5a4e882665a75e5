//! Error types for the sync engine.

use spendsync_protocol::{ExpenseId, ValidationError};
use spendsync_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in the replica or during a sync cycle.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with something the engine cannot use.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server rejected the request.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message from the error body.
        message: String,
    },

    /// Push or pull did not complete in time.
    #[error("operation timed out")]
    Timeout,

    /// Persisting the replica failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Input rejected at the boundary.
    #[error("invalid expense: {0}")]
    Validation(#[from] ValidationError),

    /// No visible record with this id.
    #[error("expense not found: {0}")]
    NotFound(ExpenseId),

    /// JSON encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The caller gave up waiting.
    #[error("sync cancelled")]
    Cancelled,

    /// The background scheduler is no longer running.
    #[error("sync scheduler has shut down")]
    ShutDown,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the next cycle may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::Server { status, .. } => *status >= 500,
            SyncError::Storage(_) => true,
            _ => false,
        }
    }
}
