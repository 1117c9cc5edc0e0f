//! Shared application state for Axum handlers.
//!
//! - **Configuration**: Runtime configuration access
//! - **Limiter**: The rate limiter shared with the middleware layer, so
//!   `/stats` can report on the same buckets the layer enforces
//! - **Catalog**: Demo aircraft and regulation records
//!
//! # Thread Safety
//!
//! Everything is behind `Arc`; the limiter synchronizes internally.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::Config;
use crate::error::AppResult;
use crate::models::Catalog;
use crate::ratelimit::RateLimiter;

/// Shared application state for Axum handlers.
///
/// This struct is cloned for each request handler. All internal data
/// is wrapped in `Arc` for efficient sharing.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Rate limiter, `None` when `RATE_LIMIT_ENABLED=false`
    pub limiter: Option<Arc<RateLimiter>>,
    /// Records served by the demo endpoints
    pub catalog: Arc<Catalog>,
}

impl AppState {
    /// Build state from configuration, creating the limiter when enabled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Policy` if the policy table is invalid.
    pub fn new(config: Config) -> AppResult<Self> {
        let limiter = if config.rate_limit_enabled {
            let limiter = RateLimiter::new(config.rate_limit_settings())?
                .with_key_resolver(config.key_resolver());
            Some(Arc::new(limiter))
        } else {
            info!("Rate limiting disabled (RATE_LIMIT_ENABLED=false)");
            None
        };

        Ok(Self::with_limiter(config, limiter))
    }

    /// Build state around an existing limiter (e.g. one on a manual clock).
    pub fn with_limiter(config: Config, limiter: Option<Arc<RateLimiter>>) -> Self {
        Self {
            config: Arc::new(config),
            started_at: Instant::now(),
            limiter,
            catalog: Arc::new(Catalog::sample()),
        }
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
