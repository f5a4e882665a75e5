//! Error types for the expense server.

use spendsync_protocol::ValidationError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the expense server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A record failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No record with this id.
    #[error("Expense not found: {0}")]
    NotFound(String),

    /// No route for this method and path.
    #[error("no route for {method} {path}")]
    NoRoute {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },

    /// Push batch over the configured limit.
    #[error("push batch of {count} records exceeds the limit of {max}")]
    BatchTooLarge {
        /// Records submitted.
        count: usize,
        /// Configured limit.
        max: usize,
    },

    /// CSV export failed.
    #[error("export failed: {0}")]
    Export(#[from] csv::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) | ServerError::Validation(_) => 400,
            ServerError::NotFound(_) | ServerError::NoRoute { .. } => 404,
            ServerError::BatchTooLarge { .. } => 413,
            ServerError::Export(_) | ServerError::Internal(_) | ServerError::Io(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}
