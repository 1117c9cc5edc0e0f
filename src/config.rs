//! Application configuration loaded from environment variables.
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_ENABLED`: Master switch (default: true)
//! - `RATE_LIMIT_REQUESTS`: Default policy requests per window (default: 60)
//! - `RATE_LIMIT_BURST`: Default policy burst capacity (default: 10)
//! - `RATE_LIMIT_WINDOW_SECS`: Default policy window (default: 60)
//! - `RATE_LIMIT_POLICIES`: Path-prefix overrides, matched in order
//!   (e.g. `/check-compliance=30:5:60;/health=off`)
//! - `RATE_LIMIT_CLEANUP_INTERVAL_SECS`: Minimum time between idle sweeps (default: 300)
//! - `RATE_LIMIT_IDLE_SECS`: Idle time before a bucket is evicted (default: 600)
//! - `RATE_LIMIT_FAILURE_MODE`: `open` or `closed` (default: open)
//! - `RATE_LIMIT_KEY_STRATEGY`: `ip`, `api_key` or `tenant` (default: ip)
//! - `RATE_LIMIT_KEY_FALLBACK_IP`: Key header-less requests by IP (default: true)
//! - `TRUSTED_PROXIES`: CIDR ranges whose forwarded headers are honored; a
//!   non-empty list with no valid range is rejected
//!
//! # Server & Observability
//!
//! - `HOST`, `PORT`, `MAX_REQUEST_BODY_SIZE`, `CORS_ALLOWED_ORIGINS`
//! - `METRICS_PORT` (0 = disabled)
//!
//! `RUST_LOG` and `LOG_FORMAT` (`text` or `json`) are read by the binary when
//! it installs the subscriber, before configuration is loaded.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::middleware::{CidrRange, TrustedProxyConfig};
use crate::ratelimit::{
    FailureMode, KeyResolver, KeyStrategy, PolicyTable, RateLimitConfig, RateLimitSettings,
};

/// Default override table: health probes unlimited, compliance checks tight.
pub const DEFAULT_POLICY_OVERRIDES: &str = "/health=off;/ready=off;/stats=600:100:60;\
/check-compliance=30:5:60;/aircraft=120:20:60;/regulations=120:20:60";

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// let limiter = RateLimiter::new(config.rate_limit_settings())?;
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    /// Allowed CORS origins; "*" allows any (default)
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// When false, the rate limit layer is not installed at all
    pub rate_limit_enabled: bool,

    /// Policy table: default policy plus ordered prefix overrides
    pub rate_limit_policies: PolicyTable,

    /// Minimum time between idle-bucket sweeps (default: 5 minutes)
    pub rate_limit_cleanup_interval: Duration,

    /// Idle time after which a bucket is evicted (default: 10 minutes)
    pub rate_limit_idle_threshold: Duration,

    /// Behavior when the limiter cannot decide (default: open)
    pub rate_limit_failure_mode: FailureMode,

    /// How callers are identified (default: ip)
    pub rate_limit_key_strategy: KeyStrategy,

    /// Fall back to the caller address when the identity header is missing
    pub rate_limit_key_fallback_ip: bool,

    /// Trusted proxy CIDR ranges for IP spoofing mitigation.
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    /// Default: Empty (trust forwarded headers from any source)
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value is malformed or any
    /// rate-limit policy is invalid (e.g., a zero window).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let default_policy = RateLimitConfig::new(
            Self::parse_env("RATE_LIMIT_REQUESTS", 60)?,
            Self::parse_env("RATE_LIMIT_BURST", 10)?,
            Self::parse_env("RATE_LIMIT_WINDOW_SECS", 60)?,
        );
        let overrides = env::var("RATE_LIMIT_POLICIES")
            .unwrap_or_else(|_| DEFAULT_POLICY_OVERRIDES.to_string());
        let rate_limit_policies = PolicyTable::parse(default_policy, &overrides)
            .map_err(|e| AppError::ConfigError(format!("Invalid RATE_LIMIT_POLICIES: {e}")))?;

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?,
            cors_allowed_origins: Self::parse_list("CORS_ALLOWED_ORIGINS", "*"),

            // Rate limiting
            rate_limit_enabled: Self::parse_env("RATE_LIMIT_ENABLED", true)?,
            rate_limit_policies,
            rate_limit_cleanup_interval: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_CLEANUP_INTERVAL_SECS",
                300,
            )?),
            rate_limit_idle_threshold: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_IDLE_SECS",
                600,
            )?),
            rate_limit_failure_mode: Self::parse_env("RATE_LIMIT_FAILURE_MODE", FailureMode::Open)?,
            rate_limit_key_strategy: Self::parse_env("RATE_LIMIT_KEY_STRATEGY", KeyStrategy::Ip)?,
            rate_limit_key_fallback_ip: Self::parse_env("RATE_LIMIT_KEY_FALLBACK_IP", true)?,
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES", ""),

            // Observability
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        self.rate_limit_policies
            .validate()
            .map_err(|e| AppError::ConfigError(format!("Invalid rate limit policy: {e}")))?;

        if self.rate_limit_cleanup_interval.is_zero() {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_CLEANUP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit_idle_threshold.is_zero() {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_IDLE_SECS must be greater than 0".to_string(),
            ));
        }

        if !self.trusted_proxies.is_empty()
            && self
                .trusted_proxies
                .iter()
                .all(|cidr| CidrRange::parse(cidr).is_none())
        {
            return Err(AppError::ConfigError(format!(
                "TRUSTED_PROXIES has no valid CIDR range: {}",
                self.trusted_proxies.join(",")
            )));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Limiter settings derived from this configuration.
    pub fn rate_limit_settings(&self) -> RateLimitSettings {
        RateLimitSettings {
            policies: self.rate_limit_policies.clone(),
            cleanup_interval: self.rate_limit_cleanup_interval,
            idle_threshold: self.rate_limit_idle_threshold,
            failure_mode: self.rate_limit_failure_mode,
        }
    }

    /// Parsed trusted proxy ranges.
    pub fn trusted_proxy_config(&self) -> TrustedProxyConfig {
        TrustedProxyConfig::new(&self.trusted_proxies)
    }

    /// Caller identity resolver for the configured key strategy.
    pub fn key_resolver(&self) -> Arc<dyn KeyResolver> {
        self.rate_limit_key_strategy
            .build(self.trusted_proxy_config(), self.rate_limit_key_fallback_ip)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated list, dropping empty entries.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        split_list(&env::var(name).unwrap_or_else(|_| default.to_string()))
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        let rate_limit_policies = PolicyTable::new(RateLimitConfig::new(60, 10, 60))
            .with_override("/health", RateLimitConfig::disabled())
            .with_override("/ready", RateLimitConfig::disabled())
            .with_override("/stats", RateLimitConfig::new(600, 100, 60))
            .with_override("/check-compliance", RateLimitConfig::new(30, 5, 60))
            .with_override("/aircraft", RateLimitConfig::new(120, 20, 60))
            .with_override("/regulations", RateLimitConfig::new(120, 20, 60));

        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_request_body_size: 1024 * 1024,
            cors_allowed_origins: vec!["*".to_string()],
            // Rate limiting
            rate_limit_enabled: true,
            rate_limit_policies,
            rate_limit_cleanup_interval: Duration::from_secs(300),
            rate_limit_idle_threshold: Duration::from_secs(600),
            rate_limit_failure_mode: FailureMode::Open,
            rate_limit_key_strategy: KeyStrategy::Ip,
            rate_limit_key_fallback_ip: true,
            trusted_proxies: vec![], // Empty = trust all (dev mode)
            // Observability
            metrics_port: 9090,
        }
    }
}
