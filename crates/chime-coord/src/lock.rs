//! Distributed mutual exclusion with a bounded lease.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Clock, CoordError, CoordinationStore, LockError};

/// Metadata written as the lock's value in the coordination store.
///
/// The serialized form doubles as the holder token: release only succeeds
/// while the store still holds this exact value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockMeta {
    /// Instance id of the process holding the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
}

/// A named mutual-exclusion lock over the shared coordination store.
///
/// Acquisition is non-blocking: a held lock means another process is
/// already doing the work this critical section guards, so callers skip
/// rather than wait. The lease bounds how long a crashed holder can keep
/// the fleet out.
pub struct DistributedLock {
    store: Arc<dyn CoordinationStore>,
    clock: Arc<dyn Clock>,
    key: String,
    lease: Duration,
}

impl DistributedLock {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        clock: Arc<dyn Clock>,
        key: impl Into<String>,
        lease: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            key: key.into(),
            lease,
        }
    }

    /// Try to take the lock for `holder`.
    ///
    /// Returns [`LockError::Contended`] when another process holds it and
    /// [`LockError::Store`] when the store is unreachable; both are soft
    /// failures for the scheduling loop.
    pub async fn acquire(&self, holder: &str) -> Result<LockGuard, LockError> {
        let meta = LockMeta {
            holder: holder.to_owned(),
            acquired_at: self.clock.now(),
        };
        let token = serde_json::to_string(&meta).map_err(CoordError::from)?;

        if self.store.try_set_nx(&self.key, &token, self.lease).await? {
            debug!(key = %self.key, holder = %meta.holder, "acquired scheduling lock");
            Ok(LockGuard {
                store: Arc::clone(&self.store),
                key: self.key.clone(),
                token,
                released: false,
            })
        } else {
            Err(LockError::Contended)
        }
    }

    /// Who currently holds the lock, if anyone.
    pub async fn holder(&self) -> Result<Option<LockMeta>, CoordError> {
        match self.store.get(&self.key).await? {
            Some(token) => Ok(Some(serde_json::from_str(&token)?)),
            None => Ok(None),
        }
    }
}

/// Scoped handle to a held [`DistributedLock`].
///
/// Released on every exit path: explicitly via [`release`](Self::release),
/// or on drop via a spawned best-effort removal. If the process dies before
/// either runs, the lease expires the key.
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard {
    store: Arc<dyn CoordinationStore>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    /// Release the lock now.
    ///
    /// Failure to reach the store is logged and swallowed; the lease will
    /// reclaim the key.
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.store.remove_if(&self.key, &self.token).await {
            debug!(key = %self.key, error = %e, "lock release failed, lease will expire");
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        // Async release from a sync drop; outside a runtime the lease
        // expiry reclaims the key instead.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = store.remove_if(&key, &token).await {
                    debug!(key = %key, error = %e, "lock release failed, lease will expire");
                }
            });
        }
    }
}
