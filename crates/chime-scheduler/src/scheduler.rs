//! The minute-aligned scheduler loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, DurationRound, Utc};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chime_coord::{Clock, CoordinationStore, DistributedLock, LeaderGate};

use crate::{PassOutcome, SchedulingPass, TaskRepository};

/// Default TTL on the leader-gate marker.
///
/// Shorter than the 60s tick period, so a claimant that dies mid-tick
/// expires before the next tick and cannot lock the fleet out.
const GATE_TTL: Duration = Duration::from_secs(30);

/// Default lease on the scheduling lock; bounds how long a crashed pass
/// can exclude the fleet.
const LOCK_LEASE: Duration = Duration::from_secs(120);

/// Configuration for a scheduler instance.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Key claimed once per tick to elect the active scheduler.
    pub gate_key: String,
    /// Key guarding the scheduling-pass critical section.
    pub lock_key: String,
    /// TTL on the leader-gate marker.
    pub gate_ttl: Duration,
    /// Lease on the scheduling lock.
    pub lock_lease: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            gate_key: "chime:scheduler".to_string(),
            lock_key: "chime:scheduler:lock".to_string(),
            gate_ttl: GATE_TTL,
            lock_lease: LOCK_LEASE,
        }
    }
}

/// The scheduler loop.
///
/// Any number of these can run concurrently across machines against the
/// same coordination store; the leader gate and the scheduling lock
/// guarantee at most one scheduling pass executes per tick fleet-wide.
/// Every tick is an idempotent opportunity, not a guaranteed execution: a
/// tick skipped by a slow pass or an unreachable store is simply picked up
/// by whichever instance wins the next one.
pub struct Scheduler {
    gate: LeaderGate,
    pass: SchedulingPass,
    clock: Arc<dyn Clock>,
    instance: String,
}

impl Scheduler {
    /// Create a scheduler with injected collaborators.
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        repository: Arc<dyn TaskRepository>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let instance = Uuid::new_v4().to_string();
        let gate = LeaderGate::new(Arc::clone(&store), config.gate_key, config.gate_ttl);
        let lock = DistributedLock::new(
            store,
            Arc::clone(&clock),
            config.lock_key,
            config.lock_lease,
        );
        let pass = SchedulingPass::new(lock, repository, Arc::clone(&clock), instance.clone());
        Self {
            gate,
            pass,
            clock,
            instance,
        }
    }

    /// Identifier of this scheduler process.
    pub fn instance_id(&self) -> &str {
        &self.instance
    }

    /// Run the scheduler loop until shutdown is signalled.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(instance = %self.instance, "scheduler starting");

        loop {
            if *shutdown_rx.borrow() {
                info!("scheduler shutting down");
                break;
            }

            self.tick().await;

            let sleep_duration = self.time_until_next_tick();
            debug!(
                seconds = sleep_duration.as_secs_f64(),
                "waiting for next minute boundary"
            );

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("scheduler received shutdown signal");
                    }
                }
                _ = sleep(sleep_duration) => {}
            }
        }

        info!("scheduler shut down gracefully");
    }

    /// One tick: claim the leader gate, and if elected run one scheduling
    /// pass.
    ///
    /// Returns `None` when this instance stayed passive: the gate was
    /// already claimed, or the coordination store was unreachable.
    pub async fn tick(&self) -> Option<PassOutcome> {
        match self.gate.try_claim(&self.instance).await {
            Ok(true) => Some(self.pass.run_once().await),
            Ok(false) => {
                debug!("leader gate already claimed this tick");
                None
            }
            Err(e) => {
                warn!(error = %e, "leader gate unreachable, skipping tick");
                None
            }
        }
    }

    /// Time remaining until the next wall-clock minute boundary.
    pub fn time_until_next_tick(&self) -> Duration {
        time_until_next_minute(self.clock.now())
    }
}

/// The wall-clock minute boundary strictly after `now`.
pub fn next_minute_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let minute = chrono::Duration::minutes(1);
    match now.duration_trunc(minute) {
        Ok(floor) => floor + minute,
        // Truncation only fails on out-of-range timestamps
        Err(_) => now + minute,
    }
}

/// How long to sleep so the next tick lands on a minute boundary.
///
/// Self-correcting: the target is the absolute boundary, so a slow pass
/// shortens the following sleep instead of drifting the cadence
/// tick-over-tick.
pub fn time_until_next_minute(now: DateTime<Utc>) -> Duration {
    (next_minute_boundary(now) - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
}
