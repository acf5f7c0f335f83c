//! Shared key-value store abstraction for fleet coordination.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::{Clock, CoordError};

/// A key-value store reachable by every scheduler instance.
///
/// The scheduler only ever mutates the store through these atomic
/// primitives; the leader gate and the scheduling lock are both built on
/// [`try_set_nx`](CoordinationStore::try_set_nx).
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Atomically set `key` to `value` with `ttl` if the key is absent.
    ///
    /// Setting the value and its expiry is a single step: there is no
    /// window where the key exists without an expiry. Returns `true` when
    /// this call created the key.
    async fn try_set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CoordError>;

    /// Current value of `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CoordError>;

    /// Remove `key` only if it currently holds exactly `value`.
    ///
    /// Returns `true` when the key was removed. A mismatched value means
    /// the key has expired and been reclaimed by another process, and is
    /// left untouched.
    async fn remove_if(&self, key: &str, value: &str) -> Result<bool, CoordError>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory [`CoordinationStore`] with lazy expiry.
///
/// Backs single-node deployments and every test in the workspace. Expiry is
/// evaluated against the injected [`Clock`] at each access, so tests drive
/// TTLs by advancing a [`ManualClock`](crate::ManualClock).
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn try_set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CoordError> {
        let now = self.clock.now();
        let stored = StoredValue {
            value: value.to_owned(),
            expires_at: chrono::Duration::from_std(ttl)
                .ok()
                .map(|ttl| now + ttl),
        };

        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(stored);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(stored);
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoordError> {
        let now = self.clock.now();
        // Copy out before any removal: holding a Ref across a remove on the
        // same shard would deadlock.
        let found = self
            .entries
            .get(key)
            .map(|entry| (entry.value.clone(), entry.is_expired(now)));

        match found {
            Some((_, true)) => {
                self.entries.remove_if(key, |_, stored| stored.is_expired(now));
                Ok(None)
            }
            Some((value, false)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    async fn remove_if(&self, key: &str, value: &str) -> Result<bool, CoordError> {
        let now = self.clock.now();
        let removed = self
            .entries
            .remove_if(key, |_, stored| {
                !stored.is_expired(now) && stored.value == value
            })
            .is_some();
        Ok(removed)
    }
}
