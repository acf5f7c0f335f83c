//! Error types for the coordination store.

use thiserror::Error;

/// Errors that can occur when talking to the shared coordination store.
#[derive(Debug, Error)]
pub enum CoordError {
    /// The store cannot be reached. Callers treat this as a soft failure
    /// and skip the current tick rather than crashing.
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    /// JSON serialization/deserialization of a stored value failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur when acquiring the scheduling lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process currently holds the lock. Routine during normal
    /// operation, not a fault.
    #[error("lock held by another process")]
    Contended,

    /// The coordination store failed.
    #[error(transparent)]
    Store(#[from] CoordError),
}
