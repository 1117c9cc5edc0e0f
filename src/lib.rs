//! # Admission Gate
//!
//! Token-bucket rate limiting for Axum services, plus a small demo API
//! that it protects.
//!
//! - **Per-caller, per-path buckets**: keyed by `"<identity>:<path>"`
//! - **Path policies**: ordered prefix overrides, first match wins
//! - **Standard headers**: `X-RateLimit-*` on every checked response,
//!   `Retry-After` on 429
//! - **Bounded memory**: idle buckets swept opportunistically
//! - **Observability**: structured `tracing` events and Prometheus counters
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RateLimitLayer → TraceLayer → CORS                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RateLimiter (PolicyTable, KeyResolver, EventSink)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BucketRegistry → TokenBucket (injected Clock)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, docs, aircraft, regulations, compliance) │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use admission_gate::{AppState, Config, build_router};
//!
//! # fn main() -> Result<(), admission_gate::AppError> {
//! let config = Config::from_env()?;
//! let state = AppState::new(config)?;
//! let app = build_router(state);
//! // Serve `app` with `into_make_service_with_connect_info::<SocketAddr>()`
//! // so the limiter can see peer addresses.
//! # Ok(())
//! # }
//! ```
//!
//! ## Using the limiter alone
//!
//! ```rust,ignore
//! let policies = PolicyTable::new(RateLimitConfig::new(60, 10, 60))
//!     .with_override("/login", RateLimitConfig::new(5, 5, 60));
//! let limiter = Arc::new(RateLimiter::new(RateLimitSettings::new(policies))?);
//! let app = Router::new().route("/login", post(login)).layer(RateLimitLayer::new(limiter));
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod ratelimit;
pub mod routes;
pub mod state;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use middleware::RateLimitLayer;
pub use ratelimit::{
    FailureMode, PolicyTable, RateLimitConfig, RateLimitSettings, RateLimiter, TokenBucket,
};
pub use routes::build_router;
pub use state::AppState;
