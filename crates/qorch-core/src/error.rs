//! Crate-wide error type.

use thiserror::Error;

/// Errors produced by core data model operations and returned up through the
/// collaborator trait boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    #[error("store error: {0}")]
    Store(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("circuit open for dependency: {0}")]
    CircuitOpen(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
