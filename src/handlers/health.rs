//! Health, readiness, and statistics endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness with version and limiter status
//! - `GET /ready` - Kubernetes-compatible readiness probe
//! - `GET /stats` - Tracked bucket count, uptime and active policies
//!
//! `/health` and `/ready` are unlimited under the default policy table so
//! probes are never throttled.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::instrument;

use crate::metrics;
use crate::models::{HealthResponse, PolicySummary, RateLimitStats, StatsResponse};
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "rate_limiting": true,
///   "version": "0.1.0",
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        rate_limiting: state.limiter.is_some(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint for Kubernetes probes.
///
/// The service holds no external connections, so it is ready as soon as it
/// is serving.
#[instrument(skip_all)]
pub async fn readiness_check(State(_state): State<AppState>) -> StatusCode {
    StatusCode::OK
}

/// Statistics endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "uptime_seconds": 3600,
///   "rate_limiting": {
///     "enabled": true,
///     "tracked_buckets": 42,
///     "failure_mode": "open",
///     "key_strategy": "ip",
///     "cleanup_interval_seconds": 300,
///     "idle_threshold_seconds": 600,
///     "policies": [{"enabled": true, "requests_per_window": 60, ...}]
///   }
/// }
/// ```
#[instrument(skip(state))]
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let config = &state.config;

    let rate_limiting = match &state.limiter {
        Some(limiter) => {
            let registry = limiter.registry();
            let tracked_buckets = registry.len();
            metrics::set_bucket_count(tracked_buckets);
            RateLimitStats {
                enabled: true,
                tracked_buckets,
                failure_mode: limiter.failure_mode().to_string(),
                key_strategy: limiter.key_strategy().to_string(),
                cleanup_interval_seconds: registry.cleanup_interval().as_secs(),
                idle_threshold_seconds: registry.idle_threshold().as_secs(),
                policies: PolicySummary::from_table(limiter.policies()),
            }
        }
        None => RateLimitStats {
            enabled: false,
            tracked_buckets: 0,
            failure_mode: config.rate_limit_failure_mode.to_string(),
            key_strategy: "none".to_string(),
            cleanup_interval_seconds: config.rate_limit_cleanup_interval.as_secs(),
            idle_threshold_seconds: config.rate_limit_idle_threshold.as_secs(),
            policies: Vec::new(),
        },
    };

    Json(StatsResponse {
        uptime_seconds: state.uptime_seconds(),
        rate_limiting,
    })
}
