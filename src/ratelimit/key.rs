//! Rate-limit identity resolution.
//!
//! A [`KeyResolver`] turns a request into the caller half of a bucket key.
//! The limiter appends `":" + path`, so every caller gets an independent
//! bucket per raw path.
//!
//! | Strategy                        | Key                    |
//! |---------------------------------|------------------------|
//! | [`IpKeyResolver`] (default)     | `ip:<caller address>`  |
//! | [`HeaderKeyResolver::api_key`]  | `api:<X-API-Key>`      |
//! | [`HeaderKeyResolver::tenant`]   | `tenant:<X-Tenant-Id>` |
//!
//! Custom strategies implement the trait and are passed to
//! [`RateLimiter::with_key_resolver`](super::RateLimiter::with_key_resolver).

use std::str::FromStr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::http::header::HeaderName;
use thiserror::Error;

use crate::middleware::ip::{TrustedProxyConfig, extract_client_ip};

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the caller's tenant id.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Faults raised inside the limiter while handling a request.
///
/// These never reach the caller directly; the configured
/// [`FailureMode`](super::FailureMode) decides what happens instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LimiterFault {
    #[error("request has no `{header}` header to derive a rate-limit key from")]
    MissingIdentity { header: String },

    #[error("`{header}` header is not valid visible ASCII")]
    InvalidIdentity { header: String },
}

/// Derives a rate-limit identity from a request.
pub trait KeyResolver: Send + Sync + 'static {
    /// Resolve the caller identity (without the path suffix).
    fn resolve(&self, req: &Request<Body>) -> Result<String, LimiterFault>;

    /// Short strategy name for logs.
    fn name(&self) -> &'static str;
}

/// Default strategy: `"ip:" + caller address`.
#[derive(Debug, Clone, Default)]
pub struct IpKeyResolver {
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl IpKeyResolver {
    pub fn new(trusted_proxies: TrustedProxyConfig) -> Self {
        Self {
            trusted_proxies: Arc::new(trusted_proxies),
        }
    }
}

impl KeyResolver for IpKeyResolver {
    fn resolve(&self, req: &Request<Body>) -> Result<String, LimiterFault> {
        Ok(format!("ip:{}", extract_client_ip(req, &self.trusted_proxies)))
    }

    fn name(&self) -> &'static str {
        "ip"
    }
}

/// Strategy keyed by a request header, e.g. an API key or tenant id.
///
/// Without a fallback, a missing header is a [`LimiterFault`]. With
/// [`HeaderKeyResolver::with_ip_fallback`], such requests are keyed by caller
/// address instead.
#[derive(Debug, Clone)]
pub struct HeaderKeyResolver {
    header: HeaderName,
    prefix: &'static str,
    name: &'static str,
    fallback: Option<IpKeyResolver>,
}

impl HeaderKeyResolver {
    pub fn new(header: HeaderName, prefix: &'static str, name: &'static str) -> Self {
        Self {
            header,
            prefix,
            name,
            fallback: None,
        }
    }

    /// `"api:" + X-API-Key`.
    pub fn api_key() -> Self {
        Self::new(HeaderName::from_static(API_KEY_HEADER), "api", "api_key")
    }

    /// `"tenant:" + X-Tenant-Id`.
    pub fn tenant() -> Self {
        Self::new(HeaderName::from_static(TENANT_HEADER), "tenant", "tenant")
    }

    /// Key requests lacking the header by caller address.
    pub fn with_ip_fallback(mut self, fallback: IpKeyResolver) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

impl KeyResolver for HeaderKeyResolver {
    fn resolve(&self, req: &Request<Body>) -> Result<String, LimiterFault> {
        let value = match req.headers().get(&self.header) {
            Some(value) => value.to_str().map_err(|_| LimiterFault::InvalidIdentity {
                header: self.header.to_string(),
            })?,
            None => "",
        };

        let value = value.trim();
        if !value.is_empty() {
            return Ok(format!("{}:{}", self.prefix, value));
        }

        match &self.fallback {
            Some(fallback) => fallback.resolve(req),
            None => Err(LimiterFault::MissingIdentity {
                header: self.header.to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Key strategy selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    #[default]
    Ip,
    ApiKey,
    Tenant,
}

impl KeyStrategy {
    /// Build the resolver for this strategy.
    pub fn build(
        self,
        trusted_proxies: TrustedProxyConfig,
        fallback_to_ip: bool,
    ) -> Arc<dyn KeyResolver> {
        let ip = IpKeyResolver::new(trusted_proxies);
        let header = match self {
            KeyStrategy::Ip => return Arc::new(ip),
            KeyStrategy::ApiKey => HeaderKeyResolver::api_key(),
            KeyStrategy::Tenant => HeaderKeyResolver::tenant(),
        };

        if fallback_to_ip {
            Arc::new(header.with_ip_fallback(ip))
        } else {
            Arc::new(header)
        }
    }
}

impl FromStr for KeyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip" => Ok(KeyStrategy::Ip),
            "api_key" | "api-key" | "apikey" => Ok(KeyStrategy::ApiKey),
            "tenant" => Ok(KeyStrategy::Tenant),
            other => Err(format!("unknown key strategy `{other}` (expected ip, api_key or tenant)")),
        }
    }
}
