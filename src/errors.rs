//! Error types for SessionSight
//!
//! Insufficient data and lifecycle misuse are never errors in this crate;
//! they degrade to empty or low-confidence results. The variants below cover
//! the failures that callers genuinely have to handle.

use thiserror::Error;

/// Main error type for the analytics core
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// Session store failures (enumeration or per-session loads)
    #[error("Session store error: {0}")]
    Store(String),

    /// A requested session does not exist in the store
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Background task failures (join errors, aborted workers)
    #[error("Background task failed: {0}")]
    Background(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic errors with context
    #[error("Analytics error: {0}")]
    Generic(String),
}

/// Result type alias for analytics operations
pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Convert anyhow errors to AnalyticsError
impl From<anyhow::Error> for AnalyticsError {
    fn from(err: anyhow::Error) -> Self {
        AnalyticsError::Generic(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AnalyticsError {
    fn from(err: tokio::task::JoinError) -> Self {
        AnalyticsError::Background(err.to_string())
    }
}
