//! Per-user anti-spam throttling
//!
//! Enforces "at most one served request per user per fixed interval". The
//! interval lives in the cache TTL: an entry expiring is what re-admits the
//! user, so no manual cleanup pass is needed and the map stays bounded.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Tracks the last served request per user id.
///
/// Enforcement is deliberately loose: two requests from the same user racing
/// through `should_serve` before either calls `mark_served` may both be
/// served. That window is harmless here and not worth a lock.
#[derive(Clone)]
pub struct RequestThrottle {
    /// user_id -> () with TTL equal to the serve interval
    cache: Cache<i64, ()>,
    /// Counter of throttled requests, for `/stats`
    silenced_count: Arc<AtomicU64>,
}

impl RequestThrottle {
    /// Creates a throttle serving each user once per `interval_secs`.
    #[must_use]
    pub fn new(interval_secs: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(std::time::Duration::from_secs(interval_secs))
            .build();

        Self {
            cache,
            silenced_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether this user's request may be served right now.
    ///
    /// Does not stamp the user; call [`Self::mark_served`] once the request
    /// is actually accepted, so rejected inputs (bad URL, gate refusal) do
    /// not burn the user's slot.
    pub async fn should_serve(&self, user_id: i64) -> bool {
        if self.cache.get(&user_id).await.is_none() {
            return true;
        }

        let count = self.silenced_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count.is_multiple_of(100) {
            debug!("throttled {} requests so far (recent: user {})", count, user_id);
        }
        false
    }

    /// Starts the serve interval for this user.
    pub async fn mark_served(&self, user_id: i64) {
        self.cache.insert(user_id, ()).await;
    }

    /// Number of users currently inside their serve interval.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Total number of throttled requests since startup.
    #[must_use]
    pub fn silenced_count(&self) -> u64 {
        self.silenced_count.load(Ordering::Relaxed)
    }
}

/// Bounded registry of users the bot has served.
///
/// Backs `/stats` and `/broadcast`. Capacity-bounded rather than unbounded;
/// under eviction a broadcast simply misses the oldest users.
#[derive(Clone)]
pub struct UserRegistry {
    cache: Cache<i64, ()>,
}

impl UserRegistry {
    /// Creates a registry holding at most `max_capacity` user ids.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    /// Records that this user was served.
    pub async fn mark_seen(&self, user_id: i64) {
        self.cache.insert(user_id, ()).await;
    }

    /// Number of distinct users seen.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Snapshot of all known user ids.
    #[must_use]
    pub fn user_ids(&self) -> Vec<i64> {
        self.cache.iter().map(|(id, ())| *id).collect()
    }
}
