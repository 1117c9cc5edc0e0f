//! Admission decisions: policy → key → bucket → consume.
//!
//! # State Machine
//!
//! ```text
//!            ┌──────────────┐  excluded path / disabled policy
//! request ──►│    CHECK     │──────────────────────────────────► BYPASS
//!            └──────┬───────┘
//!                   │ key resolution fault
//!                   ├──────────────────────────────────────────► FAULT (open: forward,
//!                   │                                                   closed: 503)
//!                   │ consume(1)
//!          ┌────────┴────────┐
//!          ▼                 ▼
//!       ALLOWED           REJECTED
//!   forward + headers   429 + headers + Retry-After
//! ```
//!
//! [`RateLimiter::check`] only decides; forwarding, header attachment and the
//! post-request sweep are done by [`RateLimitService`](crate::middleware::RateLimitService).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use tracing::{debug, info, warn};

use super::clock::{SharedClock, SystemClock};
use super::events::{EventKind, EventSink, RateLimitEvent, TracingSink};
use super::key::{IpKeyResolver, KeyResolver, LimiterFault};
use super::policy::{PolicyError, PolicyTable, RateLimitConfig};
use super::registry::{BucketRegistry, DEFAULT_CLEANUP_INTERVAL, DEFAULT_IDLE_THRESHOLD};
use super::response::RateLimitHeaders;
use crate::metrics;

/// Documentation and introspection routes that are never rate limited.
///
/// A path is excluded if it equals an entry or continues it with `/`
/// (`/docs/oauth2-redirect` is excluded, `/docsearch` is not).
pub const EXCLUDED_PATHS: [&str; 3] = ["/docs", "/redoc", "/openapi.json"];

/// Whether `path` bypasses rate limiting entirely.
pub fn is_excluded(path: &str) -> bool {
    EXCLUDED_PATHS.iter().any(|excluded| {
        path.strip_prefix(excluded)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// What to do when the limiter cannot reach a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Forward the request without rate-limit headers.
    #[default]
    Open,
    /// Answer 503 without invoking the handler.
    Closed,
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(FailureMode::Open),
            "closed" => Ok(FailureMode::Closed),
            other => Err(format!("unknown failure mode `{other}` (expected open or closed)")),
        }
    }
}

impl FailureMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            FailureMode::Open => "open",
            FailureMode::Closed => "closed",
        }
    }
}

impl std::fmt::Display for FailureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub policies: PolicyTable,
    /// Minimum time between idle-bucket sweeps.
    pub cleanup_interval: Duration,
    /// Idle time after which a bucket is evicted.
    pub idle_threshold: Duration,
    pub failure_mode: FailureMode,
}

impl RateLimitSettings {
    pub fn new(policies: PolicyTable) -> Self {
        Self {
            policies,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            failure_mode: FailureMode::default(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self::new(PolicyTable::new(RateLimitConfig::new(60, 10, 60)))
    }
}

/// Why a request skipped rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    ExcludedPath,
    PolicyDisabled,
}

/// Context of a checked request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Full bucket key: `<identity>:<path>`.
    pub bucket_key: String,
    pub path: String,
    pub policy: RateLimitConfig,
    pub headers: RateLimitHeaders,
}

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Bypass(BypassReason),
    Allowed(Admission),
    Rejected(Admission),
    Fault {
        fault: LimiterFault,
        mode: FailureMode,
    },
}

/// Shared admission controller. One instance owns one bucket registry.
pub struct RateLimiter {
    policies: PolicyTable,
    registry: BucketRegistry,
    key_resolver: Arc<dyn KeyResolver>,
    sink: Arc<dyn EventSink>,
    clock: SharedClock,
    failure_mode: FailureMode,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policies", &self.policies)
            .field("registry", &self.registry)
            .field("key_resolver", &self.key_resolver.name())
            .field("failure_mode", &self.failure_mode)
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter on the system clock, keyed by caller address and
    /// logging through [`TracingSink`].
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if any policy is invalid; a limiter never
    /// starts with a policy it cannot enforce.
    pub fn new(settings: RateLimitSettings) -> Result<Self, PolicyError> {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Create a limiter on an explicit clock.
    pub fn with_clock(settings: RateLimitSettings, clock: SharedClock) -> Result<Self, PolicyError> {
        settings.policies.validate()?;

        for (earlier, later) in settings.policies.shadowed_prefixes() {
            warn!(
                earlier,
                later,
                "Policy prefix is shadowed by an earlier entry and will never match (first match wins)"
            );
        }

        let registry = BucketRegistry::new(
            clock.clone(),
            settings.cleanup_interval,
            settings.idle_threshold,
        );

        Ok(Self {
            policies: settings.policies,
            registry,
            key_resolver: Arc::new(IpKeyResolver::default()),
            sink: Arc::new(TracingSink),
            clock,
            failure_mode: settings.failure_mode,
        })
    }

    pub fn with_key_resolver(mut self, key_resolver: Arc<dyn KeyResolver>) -> Self {
        info!(strategy = key_resolver.name(), "Rate limit key strategy configured");
        self.key_resolver = key_resolver;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn registry(&self) -> &BucketRegistry {
        &self.registry
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    /// Name of the active key resolver (`ip`, `api_key`, `tenant`).
    pub fn key_strategy(&self) -> &'static str {
        self.key_resolver.name()
    }

    /// Decide whether a request may proceed, consuming one token if so.
    pub fn check(&self, req: &Request<Body>) -> Decision {
        let path = req.uri().path();

        if is_excluded(path) {
            return Decision::Bypass(BypassReason::ExcludedPath);
        }

        let policy = self.policies.resolve(path);
        if !policy.enabled {
            return Decision::Bypass(BypassReason::PolicyDisabled);
        }

        let identity = match self.key_resolver.resolve(req) {
            Ok(identity) => identity,
            Err(fault) => {
                let detail = fault.to_string();
                self.emit(&RateLimitEvent {
                    kind: EventKind::LimiterFault,
                    key: path,
                    path,
                    limit: policy.requests_per_window,
                    window: policy.window_seconds,
                    remaining: 0,
                    retry_after: None,
                    detail: Some(&detail),
                });
                metrics::record_limiter_fault(self.failure_mode.as_str());
                return Decision::Fault {
                    fault,
                    mode: self.failure_mode,
                };
            }
        };

        let bucket_key = format!("{identity}:{path}");
        let snapshot = self
            .registry
            .get_or_create(&bucket_key, &policy)
            .try_consume(1);
        let headers = RateLimitHeaders::from_snapshot(&policy, &snapshot, self.clock.unix_now());

        let kind = if snapshot.allowed {
            EventKind::Allowed
        } else {
            EventKind::Exceeded
        };
        self.emit(&RateLimitEvent {
            kind,
            key: &bucket_key,
            path,
            limit: policy.requests_per_window,
            window: policy.window_seconds,
            remaining: headers.remaining,
            retry_after: (!snapshot.allowed).then_some(headers.retry_after),
            detail: None,
        });

        let admission = Admission {
            bucket_key,
            path: path.to_string(),
            policy,
            headers,
        };

        if snapshot.allowed {
            Decision::Allowed(admission)
        } else {
            Decision::Rejected(admission)
        }
    }

    /// Report a downstream failure for an admitted request.
    pub fn record_downstream_error(&self, admission: &Admission, error: &str) {
        self.emit(&RateLimitEvent {
            kind: EventKind::DownstreamError,
            key: &admission.bucket_key,
            path: &admission.path,
            limit: admission.policy.requests_per_window,
            window: admission.policy.window_seconds,
            remaining: admission.headers.remaining,
            retry_after: None,
            detail: Some(error),
        });
    }

    /// Sweep idle buckets if the sweep interval has elapsed.
    pub fn maybe_cleanup(&self) {
        if let Some(evicted) = self.registry.maybe_cleanup() {
            let remaining = self.registry.len();
            metrics::record_sweep(evicted, remaining);
            if evicted > 0 {
                info!(evicted, remaining, "Evicted idle rate-limit buckets");
            }
        }
    }

    /// Send an event to the sink, discarding any sink failure.
    fn emit(&self, event: &RateLimitEvent<'_>) {
        if let Err(e) = self.sink.log_event(event) {
            debug!(error = %e, event = event.kind.name(), "Dropping rate limiter event");
            metrics::record_sink_failure();
        }
    }
}
