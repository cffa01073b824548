//! Error types for synopsis.

use thiserror::Error;

/// Result type alias using synopsis' Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for synopsis operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Connection pool exhausted after the bounded wait
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected before any work was done
    #[error("Validation error: {0}")]
    Validation(String),

    /// Inference collaborator (summarizer or embedder) failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Storage backend rejected or could not complete the operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`], as seen by callers at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ResourceUnavailable,
    NotFound,
    Validation,
    Inference,
    Storage,
}

impl Error {
    /// Classify this error into the boundary taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            Error::Database(sqlx::Error::PoolTimedOut) => ErrorKind::ResourceUnavailable,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Inference(_) => ErrorKind::Inference,
            Error::Database(_) | Error::Storage(_) | Error::Config(_) | Error::Internal(_) => {
                ErrorKind::Storage
            }
        }
    }

    /// True if this error signals an unknown id or empty batch.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
