//! One scheduling pass: lock, select, submit.

use std::sync::Arc;

use tracing::{debug, warn};

use chime_coord::{Clock, DistributedLock, LockError};

use crate::{SelectError, TaskRepository};

/// What a single call to [`SchedulingPass::run_once`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The pass held the lock and walked the due set.
    Completed { submitted: usize, failed: usize },
    /// Another process holds the scheduling lock, or the coordination
    /// store was unreachable. Nothing was selected or submitted.
    Skipped,
    /// The task store is not ready to serve queries; zero submissions.
    StoreNotReady,
    /// Due-task selection failed for another reason; zero submissions.
    SelectionFailed,
}

/// One complete round of due-task selection and submission, protected by
/// the scheduling lock.
pub struct SchedulingPass {
    lock: DistributedLock,
    repository: Arc<dyn TaskRepository>,
    clock: Arc<dyn Clock>,
    instance: String,
}

impl SchedulingPass {
    pub fn new(
        lock: DistributedLock,
        repository: Arc<dyn TaskRepository>,
        clock: Arc<dyn Clock>,
        instance: String,
    ) -> Self {
        Self {
            lock,
            repository,
            clock,
            instance,
        }
    }

    /// Run one scheduling pass.
    ///
    /// The whole pass runs under the scheduling lock, and every due-task
    /// comparison uses the single `now` captured at pass start. A task
    /// whose submission fails is logged and skipped; the remaining tasks
    /// in the pass are still processed.
    #[tracing::instrument(skip(self), fields(instance = %self.instance))]
    pub async fn run_once(&self) -> PassOutcome {
        let guard = match self.lock.acquire(&self.instance).await {
            Ok(guard) => guard,
            Err(LockError::Contended) => {
                debug!("scheduling lock held elsewhere, skipping pass");
                return PassOutcome::Skipped;
            }
            Err(LockError::Store(e)) => {
                debug!(error = %e, "coordination store unavailable, skipping pass");
                return PassOutcome::Skipped;
            }
        };

        let now = self.clock.now();
        debug!(%now, "checking for due tasks");

        let outcome = match self.repository.due_tasks(now).await {
            Ok(tasks) => {
                let mut submitted = 0;
                let mut failed = 0;
                for task in tasks {
                    match task.submit().await {
                        Ok(()) => submitted += 1,
                        Err(e) => {
                            failed += 1;
                            warn!(task = %task.id(), error = %e, "task submission failed");
                        }
                    }
                }
                debug!(submitted, failed, "scheduling pass complete");
                PassOutcome::Completed { submitted, failed }
            }
            Err(SelectError::NotReady) => {
                warn!("task store not ready, nothing scheduled");
                PassOutcome::StoreNotReady
            }
            Err(SelectError::Backend(e)) => {
                warn!(error = %e, "due-task selection failed");
                PassOutcome::SelectionFailed
            }
        };

        guard.release().await;
        outcome
    }
}
