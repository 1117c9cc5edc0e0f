//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (applied in order)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 if exceeded, 503 if failing closed
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers
//! └────────┬─────────┘
//!          │
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/health`, `/ready`, `/stats` - Health & monitoring
//! - `/docs`, `/redoc`, `/openapi.json` - Documentation (never limited)
//! - `/aircraft/{id}`, `/regulations/{id}`, `/check-compliance` - Demo API

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::RateLimitLayer;
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// The rate limit layer is installed when `state.limiter` is set and shares
/// that limiter, so `/stats` reports on the buckets the layer enforces.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let cors = build_cors_layer(&config.cors_allowed_origins);

    let mut router = Router::new()
        // Health and status endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/stats", get(handlers::stats))
        // Documentation
        .route("/openapi.json", get(handlers::openapi))
        .route("/docs", get(handlers::docs))
        .route("/redoc", get(handlers::docs))
        // Demo API
        .route("/aircraft/{id}", get(handlers::get_aircraft))
        .route("/regulations/{id}", get(handlers::get_regulation))
        .route("/check-compliance", post(handlers::check_compliance));

    // =========================================================================
    // Apply Middleware Stack (order matters - applied bottom to top)
    // =========================================================================

    // 1. Request body size limit
    info!(
        max_size_kb = config.max_request_body_size / 1024,
        "Request body size limit configured"
    );
    router = router.layer(DefaultBodyLimit::max(config.max_request_body_size));

    // 2. CORS
    router = router.layer(cors);

    // 3. Tracing
    router = router.layer(TraceLayer::new_for_http());

    // 4. Rate Limiting - applied last, runs first in the request pipeline
    if let Some(limiter) = &state.limiter {
        let policies = limiter.policies();
        let default = policies.default_policy();
        info!(
            requests = default.requests_per_window,
            burst = default.burst_size,
            window_secs = default.window_seconds,
            overrides = policies.overrides().len(),
            failure_mode = %limiter.failure_mode(),
            key_strategy = limiter.key_strategy(),
            "Rate limiting enabled"
        );
        router = router.layer(RateLimitLayer::new(limiter.clone()));
    } else {
        info!("Rate limiting disabled");
    }

    router.with_state(state)
}

/// Build CORS layer from configuration.
///
/// `*` (any origin) is convenient for development; production deployments
/// should list explicit origins.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
