//! Token-bucket admission control.
//!
//! # Components
//!
//! ```text
//! RateLimiter ─┬─ PolicyTable     path → RateLimitConfig (first match wins)
//!              ├─ KeyResolver     request → caller identity
//!              ├─ BucketRegistry  "<identity>:<path>" → TokenBucket
//!              │     └─ TokenBucket (own lock, injected Clock)
//!              └─ EventSink       one event per decision
//! ```
//!
//! Everything here is synchronous and non-blocking; the Tower integration
//! lives in [`crate::middleware::rate_limit`].

pub mod bucket;
pub mod clock;
pub mod events;
pub mod key;
pub mod limiter;
pub mod policy;
pub mod registry;
pub mod response;

pub use bucket::{BucketSnapshot, TokenBucket};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use events::{EventKind, EventSink, RateLimitEvent, RecordedEvent, RecordingSink, SinkError, TracingSink};
pub use key::{HeaderKeyResolver, IpKeyResolver, KeyResolver, KeyStrategy, LimiterFault};
pub use limiter::{
    Admission, BypassReason, Decision, EXCLUDED_PATHS, FailureMode, RateLimitSettings, RateLimiter,
    is_excluded,
};
pub use policy::{PolicyError, PolicyTable, RateLimitConfig, resolve_policy};
pub use registry::BucketRegistry;
pub use response::RateLimitHeaders;
