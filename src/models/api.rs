use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ratelimit::{PolicyTable, RateLimitConfig};

/// Request to check one aircraft against a set of regulations.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComplianceCheckRequest {
    /// Aircraft identifier (e.g. `"ac-001"`)
    pub aircraft_id: String,
    /// Regulations to check; empty means every known regulation
    #[serde(default)]
    pub regulation_ids: Vec<String>,
}

/// Outcome of a single regulation check.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ComplianceFinding {
    pub regulation_id: String,
    pub compliant: bool,
}

/// Compliance check response.
#[derive(Debug, Serialize)]
pub struct ComplianceCheckResponse {
    pub aircraft_id: String,
    /// True when every finding is compliant
    pub compliant: bool,
    pub findings: Vec<ComplianceFinding>,
    pub checked_at: DateTime<Utc>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Whether the rate limit layer is installed
    pub rate_limiting: bool,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

/// One policy as reported by `/stats`.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PolicySummary {
    /// Path prefix, `None` for the default policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub enabled: bool,
    pub requests_per_window: u32,
    pub burst_size: u32,
    pub window_seconds: u32,
}

impl PolicySummary {
    fn new(prefix: Option<&str>, policy: RateLimitConfig) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            enabled: policy.enabled,
            requests_per_window: policy.requests_per_window,
            burst_size: policy.burst_size,
            window_seconds: policy.window_seconds,
        }
    }

    /// Flatten a policy table: default first, then overrides in match order.
    pub fn from_table(table: &PolicyTable) -> Vec<Self> {
        std::iter::once(Self::new(None, table.default_policy()))
            .chain(
                table
                    .overrides()
                    .iter()
                    .map(|(prefix, policy)| Self::new(Some(prefix), *policy)),
            )
            .collect()
    }
}

/// Limiter section of the statistics response.
#[derive(Debug, Serialize)]
pub struct RateLimitStats {
    pub enabled: bool,
    /// Buckets currently held in memory
    pub tracked_buckets: usize,
    pub failure_mode: String,
    pub key_strategy: String,
    pub cleanup_interval_seconds: u64,
    pub idle_threshold_seconds: u64,
    pub policies: Vec<PolicySummary>,
}

/// Statistics response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Uptime in seconds
    pub uptime_seconds: u64,
    pub rate_limiting: RateLimitStats,
}
