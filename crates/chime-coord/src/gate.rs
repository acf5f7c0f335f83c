//! Leader election for each scheduling tick.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::{CoordError, CoordinationStore};

/// Short-lived marker that picks one active scheduler per tick.
///
/// Every instance attempts [`try_claim`](Self::try_claim) at the top of its
/// tick; the store's atomic set-if-absent guarantees exactly one winner.
/// The marker's TTL is shorter than the tick period, so a claimant that
/// dies mid-tick keeps the fleet out for at most one tick before the key
/// expires and the next tick's race resumes.
pub struct LeaderGate {
    store: Arc<dyn CoordinationStore>,
    key: String,
    ttl: Duration,
}

impl LeaderGate {
    pub fn new(store: Arc<dyn CoordinationStore>, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            ttl,
        }
    }

    /// Claim leadership for this tick.
    ///
    /// Sets the gate key to `instance` with the gate TTL in a single atomic
    /// step. Returns `Ok(true)` for exactly one of any set of concurrent
    /// claimants; the rest see `Ok(false)` and stay passive this tick.
    pub async fn try_claim(&self, instance: &str) -> Result<bool, CoordError> {
        let claimed = self.store.try_set_nx(&self.key, instance, self.ttl).await?;
        if claimed {
            debug!(key = %self.key, instance = %instance, "claimed leader gate");
        }
        Ok(claimed)
    }

    /// Instance id currently holding the gate, if any.
    pub async fn holder(&self) -> Result<Option<String>, CoordError> {
        self.store.get(&self.key).await
    }
}
