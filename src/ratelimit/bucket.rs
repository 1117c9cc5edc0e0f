//! A single token bucket.
//!
//! # Algorithm
//!
//! The bucket holds up to `capacity` tokens and gains `refill_rate` tokens per
//! second. Every admission check first applies the refill owed since the last
//! update, then tries to debit:
//!
//! ```text
//! elapsed     = max(0, now - last_refill)
//! tokens      = min(capacity, tokens + elapsed * refill_rate)
//! last_refill = now
//! tokens >= n ? tokens -= n, allow : deny
//! ```
//!
//! Refill is applied on failed checks too, so `status()` always reports the
//! true balance.
//!
//! # Locking
//!
//! All state lives behind one `parking_lot::Mutex` per bucket. Critical
//! sections are a handful of float operations and never await, so holding the
//! lock inside an async request task cannot stall the runtime.

use std::time::Instant;

use parking_lot::Mutex;

use super::clock::SharedClock;

/// Balances this close to a whole token are treated as that whole token, so
/// accumulated float error never delays an admission owed by `rate * t >= 1`.
const TOKEN_EPSILON: f64 = 1e-9;

/// Mutable bucket state, only touched with the bucket lock held.
#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Result of a consume attempt plus the bucket state it left behind.
///
/// Computed under a single lock acquisition, so the reported balance is
/// exactly what the decision produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSnapshot {
    /// Whether the requested tokens were debited.
    pub allowed: bool,
    /// `floor(tokens)` after the decision.
    pub available: u64,
    /// Seconds until the next whole token is available.
    ///
    /// `Some(0.0)` when the bucket is full; `None` when the bucket never
    /// refills (`refill_rate == 0`) and is not full.
    pub seconds_until_next_token: Option<f64>,
}

/// Thread-safe token bucket with an injected clock.
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
    clock: SharedClock,
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("refill_rate", &self.refill_rate)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// Negative or non-finite arguments are treated as zero.
    pub fn new(capacity: f64, refill_rate: f64, clock: SharedClock) -> Self {
        let capacity = sanitize(capacity);
        let refill_rate = sanitize(refill_rate);
        let now = clock.now();

        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
            }),
            clock,
        }
    }

    /// Maximum number of tokens the bucket holds.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Attempt to debit `n` tokens. Never blocks.
    pub fn consume(&self, n: u32) -> bool {
        self.try_consume(n).allowed
    }

    /// Attempt to debit `n` tokens and report the resulting balance.
    pub fn try_consume(&self, n: u32) -> BucketSnapshot {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);

        let cost = f64::from(n);
        let allowed = state.tokens >= cost;
        if allowed {
            // Clamp guards against float drift taking the balance below zero.
            state.tokens = (state.tokens - cost).max(0.0);
        }

        self.snapshot(&state, allowed)
    }

    /// Apply refill without debiting and report the balance.
    ///
    /// Returns `(available, seconds_until_next_token)`; see [`BucketSnapshot`].
    pub fn status(&self) -> (u64, Option<f64>) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);

        let snapshot = self.snapshot(&state, false);
        (snapshot.available, snapshot.seconds_until_next_token)
    }

    /// Instant of the last refill, used by the registry's idle sweep.
    pub fn last_refill(&self) -> Instant {
        self.state.lock().last_refill
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        // A clock that appears to go backward yields zero elapsed time and
        // leaves `last_refill` where it was.
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            let tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
            let whole = tokens.round();
            state.tokens = if (tokens - whole).abs() < TOKEN_EPSILON {
                whole
            } else {
                tokens
            };
            state.last_refill = now;
        }
    }

    fn snapshot(&self, state: &BucketState, allowed: bool) -> BucketSnapshot {
        let tokens = state.tokens.clamp(0.0, self.capacity);

        let seconds_until_next_token = if tokens >= self.capacity {
            Some(0.0)
        } else if self.refill_rate > 0.0 {
            Some((1.0 - tokens.fract()) / self.refill_rate)
        } else {
            None
        };

        BucketSnapshot {
            allowed,
            // `tokens` is finite and within [0, capacity] here.
            available: tokens.floor() as u64,
            seconds_until_next_token,
        }
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
