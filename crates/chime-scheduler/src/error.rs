//! Error types for the scheduling core.

use thiserror::Error;

/// A task's submission into the execution layer failed.
///
/// Opaque to the scheduler: the execution layer owns retry semantics, the
/// scheduler only logs the failure and moves on to the next task.
#[derive(Debug, Error)]
#[error("task submission failed: {0}")]
pub struct SubmitError(String);

impl SubmitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors from selecting due tasks out of the task store.
#[derive(Debug, Error)]
pub enum SelectError {
    /// The backing task store cannot serve queries yet, e.g. its schema
    /// has not been migrated. Callers log a warning and skip the pass
    /// instead of crashing.
    #[error("task store not ready")]
    NotReady,

    /// Any other task store failure.
    #[error("task store error: {0}")]
    Backend(String),
}
