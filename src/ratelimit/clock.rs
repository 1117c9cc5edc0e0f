//! Time sources for the rate limiter.
//!
//! Refill arithmetic runs on a **monotonic** clock so wall-clock adjustments
//! (NTP steps, manual changes) cannot mint or destroy tokens. The wall clock is
//! only consulted to render the absolute `X-RateLimit-Reset` timestamp.
//!
//! [`ManualClock`] lets tests drive time explicitly instead of sleeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;

/// Source of time for token buckets and the bucket registry.
pub trait Clock: Send + Sync + 'static {
    /// Monotonic instant used for refill and idle-time arithmetic.
    fn now(&self) -> Instant;

    /// Wall-clock seconds since the Unix epoch.
    fn unix_now(&self) -> i64;
}

/// Shared, type-erased clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Production clock backed by [`Instant::now`] and the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn unix_now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Starts at a fixed origin and only moves when told to. It can also be
/// rewound, which is how clock anomalies are simulated.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    unix_origin: i64,
    offset_nanos: AtomicI64,
}

impl ManualClock {
    /// Unix timestamp reported at offset zero.
    pub const DEFAULT_UNIX_ORIGIN: i64 = 1_700_000_000;

    pub fn new() -> Self {
        Self::with_unix_origin(Self::DEFAULT_UNIX_ORIGIN)
    }

    pub fn with_unix_origin(unix_origin: i64) -> Self {
        Self {
            origin: Instant::now(),
            unix_origin,
            offset_nanos: AtomicI64::new(0),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let nanos = i64::try_from(by.as_nanos()).unwrap_or(i64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Move the clock backward, simulating a clock anomaly.
    pub fn rewind(&self, by: Duration) {
        let nanos = i64::try_from(by.as_nanos()).unwrap_or(i64::MAX);
        self.offset_nanos.fetch_sub(nanos, Ordering::SeqCst);
    }

    /// Current offset from the origin (negative after a rewind past it).
    fn offset(&self) -> i64 {
        self.offset_nanos.load(Ordering::SeqCst)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset();
        if offset >= 0 {
            self.origin + Duration::from_nanos(offset.unsigned_abs())
        } else {
            self.origin
                .checked_sub(Duration::from_nanos(offset.unsigned_abs()))
                .unwrap_or(self.origin)
        }
    }

    fn unix_now(&self) -> i64 {
        self.unix_origin + self.offset().div_euclid(1_000_000_000)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_starts_at_origin() {
        let clock = ManualClock::new();
        assert_eq!(clock.unix_now(), ManualClock::DEFAULT_UNIX_ORIGIN);
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::with_unix_origin(1_000);
        let start = clock.now();

        clock.advance(Duration::from_millis(2_500));

        assert_eq!(clock.now().duration_since(start), Duration::from_millis(2_500));
        assert_eq!(clock.unix_now(), 1_002);
    }

    #[test]
    fn test_manual_clock_rewind() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_secs(10));
        let later = clock.now();

        clock.rewind(Duration::from_secs(4));

        assert!(clock.now() < later);
        assert_eq!(later.duration_since(clock.now()), Duration::from_secs(4));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(clock.unix_now() > 0);
    }
}
