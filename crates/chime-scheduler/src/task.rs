//! External task collaborators.
//!
//! Task definitions live in an external store and execute in an external
//! worker layer; the scheduler only selects what is due and submits it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{SelectError, SubmitError};

/// A persisted repeating task definition.
///
/// Owned by the persistence layer. The scheduler reads `next_run` and calls
/// [`submit`](Self::submit), nothing else.
#[async_trait]
pub trait RepeatingTask: Send + Sync {
    /// Stable identifier, used in logs.
    fn id(&self) -> &str;

    /// When this task should next run.
    fn next_run(&self) -> DateTime<Utc>;

    /// Enqueue one execution instance with the task-processing layer.
    ///
    /// The implementation is responsible for advancing `next_run` to the
    /// task's next occurrence; across successive submissions `next_run`
    /// never decreases.
    async fn submit(&self) -> Result<(), SubmitError>;
}

/// Query surface of the external task store.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Every repeating task with `next_run <= now`, in no particular order.
    async fn due_tasks(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Arc<dyn RepeatingTask>>, SelectError>;
}
