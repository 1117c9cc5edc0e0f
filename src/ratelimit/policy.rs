//! Rate-limit policies and path-based policy resolution.
//!
//! # Resolution
//!
//! The policy table is an **ordered** list of `(path_prefix, policy)` pairs.
//! [`resolve_policy`] walks it in order and returns the first entry whose
//! prefix matches the request path, or the default policy if none does.
//!
//! First match wins, not longest prefix. With overlapping prefixes such as
//! `/compliance` and `/compliance/check`, the more specific entry is dead
//! unless it is listed first. [`PolicyTable::shadowed_prefixes`] reports such
//! pairs so startup can warn about them.
//!
//! # Override Syntax
//!
//! `RATE_LIMIT_POLICIES` holds `;`-separated entries:
//!
//! ```text
//! /check-compliance=30:5:60;/aircraft=120:20:60;/health=off
//! ```
//!
//! `requests:burst:window_seconds` configures an enabled policy; `off`
//! disables limiting for the prefix.

use thiserror::Error;
use tracing::warn;

/// Errors raised while building or validating policies.
///
/// These are startup errors: a limiter with an invalid policy refuses to run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("{scope}: window_seconds must be greater than 0")]
    ZeroWindow { scope: String },

    #[error("policy entry `{entry}` is malformed: {reason}")]
    Malformed { entry: String, reason: String },

    #[error("policy prefix `{prefix}` must start with '/'")]
    InvalidPrefix { prefix: String },
}

/// Immutable rate-limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests granted per window (sustained rate).
    pub requests_per_window: u32,
    /// Bucket capacity: largest instantaneous burst.
    pub burst_size: u32,
    /// Window length in seconds.
    pub window_seconds: u32,
    /// Disabled policies bypass limiting entirely.
    pub enabled: bool,
}

impl RateLimitConfig {
    pub const fn new(requests_per_window: u32, burst_size: u32, window_seconds: u32) -> Self {
        Self {
            requests_per_window,
            burst_size,
            window_seconds,
            enabled: true,
        }
    }

    /// A policy that never limits.
    pub const fn disabled() -> Self {
        Self {
            requests_per_window: 0,
            burst_size: 0,
            window_seconds: 60,
            enabled: false,
        }
    }

    /// Tokens added per second.
    ///
    /// Returns 0 for a zero window; [`RateLimitConfig::validate`] rejects
    /// such policies before they reach a bucket.
    pub fn refill_rate(&self) -> f64 {
        if self.window_seconds == 0 {
            return 0.0;
        }
        f64::from(self.requests_per_window) / f64::from(self.window_seconds)
    }

    /// Check the policy is usable. `scope` names it in the error message.
    pub fn validate(&self, scope: &str) -> Result<(), PolicyError> {
        if self.window_seconds == 0 {
            return Err(PolicyError::ZeroWindow {
                scope: scope.to_string(),
            });
        }
        if self.enabled && self.burst_size == 0 {
            warn!(scope, "Policy has burst_size 0; every request will be rejected");
        }
        Ok(())
    }

    /// Parse one override value: `requests:burst:window` or `off`.
    fn parse_value(entry: &str, value: &str) -> Result<Self, PolicyError> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("off") || value.eq_ignore_ascii_case("disabled") {
            return Ok(Self::disabled());
        }

        let malformed = |reason: &str| PolicyError::Malformed {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = value.split(':').map(str::trim).collect();
        let [requests, burst, window] = parts.as_slice() else {
            return Err(malformed("expected requests:burst:window or off"));
        };

        let requests: u32 = requests
            .parse()
            .map_err(|_| malformed("requests is not a non-negative integer"))?;
        let burst: u32 = burst
            .parse()
            .map_err(|_| malformed("burst is not a non-negative integer"))?;
        let window: u32 = window
            .parse()
            .map_err(|_| malformed("window is not a non-negative integer"))?;

        Ok(Self::new(requests, burst, window))
    }
}

/// Ordered prefix → policy table with a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    default: RateLimitConfig,
    overrides: Vec<(String, RateLimitConfig)>,
}

impl PolicyTable {
    pub fn new(default: RateLimitConfig) -> Self {
        Self {
            default,
            overrides: Vec::new(),
        }
    }

    /// Append an override. Entries are matched in insertion order.
    pub fn with_override(mut self, prefix: impl Into<String>, policy: RateLimitConfig) -> Self {
        self.overrides.push((prefix.into(), policy));
        self
    }

    /// Build a table from a default and a `RATE_LIMIT_POLICIES` string.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Malformed`] or [`PolicyError::InvalidPrefix`]
    /// for unparseable entries. Use [`PolicyTable::validate`] afterwards to
    /// check the policies themselves.
    pub fn parse(default: RateLimitConfig, spec: &str) -> Result<Self, PolicyError> {
        let mut table = Self::new(default);

        for entry in spec.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((prefix, value)) = entry.split_once('=') else {
                return Err(PolicyError::Malformed {
                    entry: entry.to_string(),
                    reason: "expected prefix=policy".to_string(),
                });
            };

            let prefix = prefix.trim();
            if !prefix.starts_with('/') {
                return Err(PolicyError::InvalidPrefix {
                    prefix: prefix.to_string(),
                });
            }

            let policy = RateLimitConfig::parse_value(entry, value)?;
            table.overrides.push((prefix.to_string(), policy));
        }

        Ok(table)
    }

    pub fn default_policy(&self) -> RateLimitConfig {
        self.default
    }

    pub fn overrides(&self) -> &[(String, RateLimitConfig)] {
        &self.overrides
    }

    /// Validate the default policy and every override.
    pub fn validate(&self) -> Result<(), PolicyError> {
        self.default.validate("default policy")?;
        for (prefix, policy) in &self.overrides {
            policy.validate(prefix)?;
        }
        Ok(())
    }

    /// Pairs `(earlier, later)` where `later` can never match because
    /// `earlier` is listed first and is a prefix of it.
    pub fn shadowed_prefixes(&self) -> Vec<(&str, &str)> {
        let mut shadowed = Vec::new();
        for (i, (later, _)) in self.overrides.iter().enumerate() {
            if let Some((earlier, _)) = self
                .overrides
                .iter()
                .take(i)
                .find(|(earlier, _)| later.starts_with(earlier.as_str()))
            {
                shadowed.push((earlier.as_str(), later.as_str()));
            }
        }
        shadowed
    }

    /// Resolve the policy for a request path.
    #[inline]
    pub fn resolve(&self, path: &str) -> RateLimitConfig {
        resolve_policy(path, self)
    }
}

/// First-match-wins policy lookup.
pub fn resolve_policy(path: &str, table: &PolicyTable) -> RateLimitConfig {
    table
        .overrides
        .iter()
        .find(|(prefix, _)| path.starts_with(prefix.as_str()))
        .map(|(_, policy)| *policy)
        .unwrap_or(table.default)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn table() -> PolicyTable {
        PolicyTable::new(RateLimitConfig::new(60, 10, 60))
            .with_override("/check-compliance", RateLimitConfig::new(30, 5, 60))
            .with_override("/health", RateLimitConfig::disabled())
    }

    #[test]
    fn test_refill_rate() {
        let policy = RateLimitConfig::new(30, 5, 60);
        assert!((policy.refill_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(RateLimitConfig::new(30, 5, 0).refill_rate(), 0.0);
    }

    #[test]
    fn test_resolve_matches_prefix() {
        let table = table();
        assert_eq!(
            table.resolve("/check-compliance/batch"),
            RateLimitConfig::new(30, 5, 60)
        );
        assert!(!table.resolve("/health").enabled);
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        assert_eq!(table().resolve("/aircraft/N123"), RateLimitConfig::new(60, 10, 60));
    }

    #[test]
    fn test_first_match_wins_over_longest_prefix() {
        let table = PolicyTable::new(RateLimitConfig::new(60, 10, 60))
            .with_override("/compliance", RateLimitConfig::new(100, 10, 60))
            .with_override("/compliance/check", RateLimitConfig::new(5, 1, 60));

        assert_eq!(
            resolve_policy("/compliance/check", &table),
            RateLimitConfig::new(100, 10, 60)
        );
        assert_eq!(
            table.shadowed_prefixes(),
            vec![("/compliance", "/compliance/check")]
        );
    }

    #[test]
    fn test_no_shadowing_when_specific_entry_first() {
        let table = PolicyTable::new(RateLimitConfig::new(60, 10, 60))
            .with_override("/compliance/check", RateLimitConfig::new(5, 1, 60))
            .with_override("/compliance", RateLimitConfig::new(100, 10, 60));

        assert!(table.shadowed_prefixes().is_empty());
        assert_eq!(table.resolve("/compliance/check").burst_size, 1);
    }

    #[test]
    fn test_parse_overrides_preserves_order() {
        let table = PolicyTable::parse(
            RateLimitConfig::new(60, 10, 60),
            " /check-compliance=30:5:60 ; /health=off;/aircraft = 120 : 20 : 60 ;",
        )
        .unwrap();

        let prefixes: Vec<_> = table.overrides().iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(prefixes, vec!["/check-compliance", "/health", "/aircraft"]);
        assert_eq!(table.overrides()[2].1, RateLimitConfig::new(120, 20, 60));
        assert!(!table.overrides()[1].1.enabled);
    }

    #[test]
    fn test_parse_empty_spec() {
        let table = PolicyTable::parse(RateLimitConfig::new(60, 10, 60), "").unwrap();
        assert!(table.overrides().is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_entries() {
        let default = RateLimitConfig::new(60, 10, 60);

        assert!(matches!(
            PolicyTable::parse(default, "/a"),
            Err(PolicyError::Malformed { .. })
        ));
        assert!(matches!(
            PolicyTable::parse(default, "/a=1:2"),
            Err(PolicyError::Malformed { .. })
        ));
        assert!(matches!(
            PolicyTable::parse(default, "/a=1:x:60"),
            Err(PolicyError::Malformed { .. })
        ));
        assert!(matches!(
            PolicyTable::parse(default, "/a=-1:2:60"),
            Err(PolicyError::Malformed { .. })
        ));
        assert!(matches!(
            PolicyTable::parse(default, "a=1:2:60"),
            Err(PolicyError::InvalidPrefix { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let table = PolicyTable::parse(RateLimitConfig::new(60, 10, 60), "/x=10:5:0").unwrap();
        let err = table.validate().unwrap_err();
        assert_eq!(
            err,
            PolicyError::ZeroWindow {
                scope: "/x".to_string()
            }
        );

        let bad_default = PolicyTable::new(RateLimitConfig::new(60, 10, 0));
        assert!(bad_default.validate().unwrap_err().to_string().contains("default policy"));
    }

    #[test]
    fn test_validate_accepts_disabled_policies() {
        assert!(table().validate().is_ok());
    }
}
