//! Error types for the medassist library.
//!
//! This module provides custom error types using `thiserror` so that callers can
//! tell a missing record apart from a bad request, a failing upstream service or
//! an unavailable store.

use thiserror::Error;

/// Errors that can occur in the medassist application.
#[derive(Error, Debug)]
pub enum AssistantError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No connection could be checked out of the pool
    #[error("Database unavailable: {0}")]
    Pool(#[from] r2d2::Error),

    /// Referenced record is absent or not owned by the caller
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. "Medication"
        entity: &'static str,
        /// Requested identifier
        id: i64,
    },

    /// Unique constraint violated (username, email)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request field failed validation
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Timestamp or time-of-day text could not be understood
    #[error("Invalid time: {0}")]
    InvalidTime(String),

    /// Text generation or speech synthesis failed
    #[error("External service error: {0}")]
    External(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Store work handed to the blocking pool panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Convenience type alias for Result with `AssistantError`
pub type Result<T> = std::result::Result<T, AssistantError>;

impl AssistantError {
    /// Shorthand for a [`AssistantError::NotFound`].
    #[must_use]
    pub const fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// True when no pooled connection could be checked out. The scanner stops
    /// the current step and retries on the next cycle.
    #[must_use]
    pub const fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::Pool(_))
    }
}

impl From<config::ConfigError> for AssistantError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
