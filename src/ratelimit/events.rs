//! Decision events and the observability sink they are sent to.
//!
//! Every admission decision produces exactly one [`RateLimitEvent`]. Sinks are
//! fire-and-forget: the limiter ignores a sink's error beyond counting it, so
//! a broken log pipeline never changes a decision or delays a response.

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::metrics;

/// What the limiter decided (or what went wrong around the decision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Token consumed, request forwarded.
    Allowed,
    /// Bucket empty, 429 returned.
    Exceeded,
    /// Request was allowed but the downstream service failed.
    DownstreamError,
    /// The limiter itself could not reach a decision.
    LimiterFault,
}

impl EventKind {
    /// Stable event name used in logs and metrics.
    pub const fn name(self) -> &'static str {
        match self {
            EventKind::Allowed => "rate_limited_request_success",
            EventKind::Exceeded => "rate_limit_exceeded",
            EventKind::DownstreamError => "rate_limited_request_error",
            EventKind::LimiterFault => "rate_limiter_fault",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One limiter event with its decision context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEvent<'a> {
    pub kind: EventKind,
    /// Bucket key (`<identity>:<path>`), or the path alone for faults.
    pub key: &'a str,
    pub path: &'a str,
    pub limit: u32,
    pub window: u32,
    pub remaining: u64,
    /// Present on rejections.
    pub retry_after: Option<u64>,
    /// Error text for downstream errors and faults.
    pub detail: Option<&'a str>,
}

/// Failure reported by a sink. Logged at debug level and discarded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("event sink unavailable: {0}")]
pub struct SinkError(pub String);

/// Receiver of limiter events.
pub trait EventSink: Send + Sync + 'static {
    fn log_event(&self, event: &RateLimitEvent<'_>) -> Result<(), SinkError>;
}

/// Default sink: structured `tracing` events plus Prometheus counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn log_event(&self, event: &RateLimitEvent<'_>) -> Result<(), SinkError> {
        let name = event.kind.name();
        match event.kind {
            EventKind::Allowed => debug!(
                event = name,
                key = %event.key,
                path = %event.path,
                limit = event.limit,
                remaining = event.remaining,
                "Request admitted"
            ),
            EventKind::Exceeded => warn!(
                event = name,
                key = %event.key,
                path = %event.path,
                limit = event.limit,
                window = event.window,
                retry_after_secs = event.retry_after.unwrap_or_default(),
                "Rate limit exceeded"
            ),
            EventKind::DownstreamError => error!(
                event = name,
                key = %event.key,
                path = %event.path,
                limit = event.limit,
                error = event.detail.unwrap_or_default(),
                "Downstream service failed for admitted request"
            ),
            EventKind::LimiterFault => error!(
                event = name,
                path = %event.path,
                error = event.detail.unwrap_or_default(),
                "Rate limiter fault"
            ),
        }

        metrics::record_decision(event.kind);
        Ok(())
    }
}

/// Owned copy of an event kept by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub kind: EventKind,
    pub key: String,
    pub path: String,
    pub limit: u32,
    pub remaining: u64,
    pub retry_after: Option<u64>,
    pub detail: Option<String>,
}

/// In-memory sink for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }
}

impl EventSink for RecordingSink {
    fn log_event(&self, event: &RateLimitEvent<'_>) -> Result<(), SinkError> {
        self.events.lock().push(RecordedEvent {
            kind: event.kind,
            key: event.key.to_string(),
            path: event.path.to_string(),
            limit: event.limit,
            remaining: event.remaining,
            retry_after: event.retry_after,
            detail: event.detail.map(str::to_string),
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn event(kind: EventKind) -> RateLimitEvent<'static> {
        RateLimitEvent {
            kind,
            key: "ip:1.2.3.4:/x",
            path: "/x",
            limit: 30,
            window: 60,
            remaining: 0,
            retry_after: Some(2),
            detail: None,
        }
    }

    #[test]
    fn test_event_names() {
        assert_eq!(EventKind::Allowed.name(), "rate_limited_request_success");
        assert_eq!(EventKind::Exceeded.to_string(), "rate_limit_exceeded");
    }

    #[test]
    fn test_tracing_sink_never_fails() {
        for kind in [
            EventKind::Allowed,
            EventKind::Exceeded,
            EventKind::DownstreamError,
            EventKind::LimiterFault,
        ] {
            assert!(TracingSink.log_event(&event(kind)).is_ok());
        }
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.log_event(&event(EventKind::Allowed)).unwrap();
        sink.log_event(&event(EventKind::Exceeded)).unwrap();

        assert_eq!(sink.kinds(), vec![EventKind::Allowed, EventKind::Exceeded]);
        assert_eq!(sink.events()[1].retry_after, Some(2));
    }
}
