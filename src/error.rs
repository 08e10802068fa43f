//! Error types for rollcall.
//!
//! Validation and persistence failures are returned to the caller of the
//! call that caused them. Synchronizer failures are recorded per operation
//! during a drain and never abort it.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, RollcallError>;

/// All errors produced by rollcall.
#[derive(Debug, Error)]
pub enum RollcallError {
    /// An operation failed shape or type validation at enqueue time.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The queue snapshot could not be written durably.
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// A remote upload or download failed.
    #[error("Sync failed: {0}")]
    Sync(String),

    /// The operation type is reserved but cannot be executed.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A local database call failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another process holds the queue's writer lock.
    #[error("Queue busy: {0}")]
    Busy(String),

    /// A requested item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON (de)serialization failed.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RollcallError {
    /// Whether the failure may succeed on a later attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Sync(_) | Self::Busy(_) | Self::Io(_))
    }
}

impl From<reqwest::Error> for RollcallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Sync(format!("Malformed response from remote: {err}"))
        } else {
            Self::Sync(err.to_string())
        }
    }
}
