//! Concurrent registry of token buckets keyed by caller identity and path.
//!
//! # Locking
//!
//! ```text
//! registry RwLock<HashMap<key, Arc<TokenBucket>>>   (map shape: insert / evict)
//!        └── per-bucket Mutex                       (token balance)
//! ```
//!
//! - Lookups take the read lock; only a miss upgrades to the write lock, and
//!   the entry API makes creation exclusive, so concurrent first requests for a
//!   key share one bucket.
//! - The request path drops the registry lock before touching a bucket.
//! - The sweep holds the write lock for the whole pass and locks buckets
//!   inside it (registry → bucket). Nothing locks in the opposite order.
//!
//! # Eviction
//!
//! [`BucketRegistry::maybe_cleanup`] is called from request handling and runs a
//! sweep at most once per `cleanup_interval`. A bucket idle longer than
//! `idle_threshold` has refilled to capacity, so evicting it loses no state:
//! the next request recreates an identical full bucket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::bucket::TokenBucket;
use super::clock::SharedClock;
use super::policy::RateLimitConfig;

/// Default minimum interval between sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default idle time after which a bucket is evicted.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(10 * 60);

/// Key → bucket map with lazy creation and throttled idle eviction.
pub struct BucketRegistry {
    buckets: RwLock<HashMap<String, Arc<TokenBucket>>>,
    clock: SharedClock,
    cleanup_interval: Duration,
    idle_threshold: Duration,
    last_sweep: Mutex<Instant>,
}

impl std::fmt::Debug for BucketRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketRegistry")
            .field("buckets", &self.len())
            .field("cleanup_interval", &self.cleanup_interval)
            .field("idle_threshold", &self.idle_threshold)
            .finish()
    }
}

impl BucketRegistry {
    /// Create an empty registry.
    ///
    /// The sweep timer starts now, so the first sweep happens no earlier than
    /// `cleanup_interval` from construction.
    pub fn new(clock: SharedClock, cleanup_interval: Duration, idle_threshold: Duration) -> Self {
        let now = clock.now();
        Self {
            buckets: RwLock::new(HashMap::new()),
            clock,
            cleanup_interval,
            idle_threshold,
            last_sweep: Mutex::new(now),
        }
    }

    /// Return the bucket for `key`, creating it from `policy` if absent.
    ///
    /// An existing bucket keeps the capacity and rate it was created with,
    /// even if `policy` has since changed.
    pub fn get_or_create(&self, key: &str, policy: &RateLimitConfig) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.read().get(key) {
            return bucket.clone();
        }

        let mut buckets = self.buckets.write();
        buckets
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(key, burst = policy.burst_size, "Creating token bucket");
                Arc::new(TokenBucket::new(
                    f64::from(policy.burst_size),
                    policy.refill_rate(),
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    /// Remove every bucket idle for longer than `idle_threshold`.
    ///
    /// Returns the number of evicted buckets.
    pub fn cleanup(&self, idle_threshold: Duration) -> usize {
        let now = self.clock.now();
        let mut buckets = self.buckets.write();
        let before = buckets.len();

        buckets.retain(|_, bucket| {
            now.saturating_duration_since(bucket.last_refill()) <= idle_threshold
        });

        let evicted = before - buckets.len();
        debug!(
            evicted,
            remaining = buckets.len(),
            "Token bucket sweep complete"
        );
        evicted
    }

    /// Run [`BucketRegistry::cleanup`] if the sweep interval has elapsed.
    ///
    /// Returns `Some(evicted)` when this call performed the sweep. Concurrent
    /// callers that lose the race return `None` without waiting.
    pub fn maybe_cleanup(&self) -> Option<usize> {
        let now = self.clock.now();
        {
            let mut last_sweep = self.last_sweep.try_lock()?;
            if now.saturating_duration_since(*last_sweep) < self.cleanup_interval {
                return None;
            }
            *last_sweep = now;
        }
        Some(self.cleanup(self.idle_threshold))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.buckets.read().contains_key(key)
    }

    /// Number of tracked buckets.
    pub fn len(&self) -> usize {
        self.buckets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.read().is_empty()
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }
}
