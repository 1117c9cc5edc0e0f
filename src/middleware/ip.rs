//! Caller address extraction for rate-limit keys.
//!
//! # Resolution Order
//!
//! 1. `X-Forwarded-For` (first entry of the comma-separated list)
//! 2. `X-Real-IP`
//! 3. The socket peer address (`ConnectInfo<SocketAddr>`), when the server was
//!    started with `into_make_service_with_connect_info`
//! 4. [`UNKNOWN_IP`]
//!
//! # Security Warning: IP Spoofing Risk
//!
//! Forwarded-address headers are client-controlled unless a reverse proxy
//! overwrites them. A caller that can reach this service directly can rotate
//! spoofed addresses and get a fresh bucket per request.
//!
//! Configure `TRUSTED_PROXIES` with your proxy's CIDR ranges. When it is set,
//! the forwarded headers are honored **only** when the socket peer falls
//! inside one of those ranges; any other request is keyed by its peer address.
//!
//! ## The "unknown" Fallback
//!
//! Requests with no headers and no peer information share the `"unknown"`
//! key, so they are collectively rate-limited. Monitor for high "unknown"
//! traffic in production logs.

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::{debug, warn};

/// Fallback address when no client address can be determined.
pub const UNKNOWN_IP: &str = "unknown";

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range for trusted proxy validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse a CIDR string (e.g., "10.0.0.0/8" or "::1/128").
    ///
    /// A bare address is accepted as a /32 or /128. Returns `None` if the
    /// format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();

        let Some((addr, prefix)) = cidr.split_once('/') else {
            let network: IpAddr = cidr.parse().ok()?;
            return Some(Self {
                network,
                prefix_len: max_prefix(&network),
            });
        };

        let network: IpAddr = addr.parse().ok()?;
        let prefix_len: u8 = prefix.parse().ok()?;
        if prefix_len > max_prefix(&network) {
            return None;
        }

        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Check if an address is inside this range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix_len)).unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix_len)).unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

fn max_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Set of trusted reverse-proxy networks.
///
/// Empty means "trust forwarded headers from anyone", which is only safe when
/// the service is unreachable except through a proxy that overwrites them.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Build from CIDR strings. Invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy validation enabled");
        }

        Self { ranges }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Whether forwarded headers from `peer` may be honored.
    pub fn is_trusted(&self, peer: &IpAddr) -> bool {
        self.ranges.is_empty() || self.ranges.iter().any(|range| range.contains(peer))
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Address found in forwarded-address headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwardedIp<'a> {
    FromXff(&'a str),
    FromRealIp(&'a str),
    NotFound,
}

#[inline]
fn forwarded_ip<B>(req: &Request<B>) -> ForwardedIp<'_> {
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first_ip) = value.split(',').next()
        && !first_ip.trim().is_empty()
    {
        return ForwardedIp::FromXff(first_ip.trim());
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return ForwardedIp::FromRealIp(value.trim());
    }

    ForwardedIp::NotFound
}

#[inline]
fn peer_addr<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Determine the caller address for a request.
///
/// Returns `Cow::Borrowed(UNKNOWN_IP)` when nothing identifies the caller.
pub fn extract_client_ip<B>(req: &Request<B>, trusted_proxies: &TrustedProxyConfig) -> Cow<'static, str> {
    let peer = peer_addr(req);

    let headers_trusted = match (trusted_proxies.is_enabled(), peer) {
        (false, _) => true,
        (true, Some(peer)) => trusted_proxies.is_trusted(&peer),
        // Validation is on but the peer is unknown: never trust the headers.
        (true, None) => false,
    };

    if headers_trusted {
        match forwarded_ip(req) {
            ForwardedIp::FromXff(ip) | ForwardedIp::FromRealIp(ip) => {
                return Cow::Owned(ip.to_string());
            }
            ForwardedIp::NotFound => {}
        }
    } else if forwarded_ip(req) != ForwardedIp::NotFound {
        debug!(
            peer = ?peer,
            "Ignoring forwarded-address headers from untrusted peer"
        );
    }

    match peer {
        Some(peer) => Cow::Owned(peer.to_string()),
        None => Cow::Borrowed(UNKNOWN_IP),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn untrusted() -> TrustedProxyConfig {
        TrustedProxyConfig::default()
    }

    fn with_peer(mut req: Request<Body>, peer: &str) -> Request<Body> {
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[test]
    fn test_extract_ip_from_xff() {
        let req = Request::builder()
            .header("x-forwarded-for", "192.168.1.1, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_client_ip(&req, &untrusted()), "192.168.1.1");
    }

    #[test]
    fn test_extract_ip_from_real_ip() {
        let req = Request::builder()
            .header("x-real-ip", " 192.168.1.1 ")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_client_ip(&req, &untrusted()), "192.168.1.1");
    }

    #[test]
    fn test_extract_ip_xff_priority_over_real_ip() {
        let req = Request::builder()
            .header("x-forwarded-for", "10.0.0.1")
            .header("x-real-ip", "192.168.1.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_client_ip(&req, &untrusted()), "10.0.0.1");
    }

    #[test]
    fn test_extract_ip_falls_back_to_peer() {
        let req = with_peer(Request::builder().body(Body::empty()).unwrap(), "203.0.113.7:4444");
        assert_eq!(extract_client_ip(&req, &untrusted()), "203.0.113.7");
    }

    #[test]
    fn test_empty_xff_falls_through() {
        let req = Request::builder()
            .header("x-forwarded-for", "   ")
            .header("x-real-ip", "192.168.1.9")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_client_ip(&req, &untrusted()), "192.168.1.9");
    }

    #[test]
    fn test_extract_ip_unknown_is_borrowed() {
        let req = Request::builder().body(Body::empty()).unwrap();

        let ip = extract_client_ip(&req, &untrusted());
        assert_eq!(ip, UNKNOWN_IP);
        assert!(matches!(ip, Cow::Borrowed(_)));
    }

    #[test]
    fn test_xff_ipv6() {
        let req = Request::builder()
            .header("x-forwarded-for", "2001:db8::1, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_client_ip(&req, &untrusted()), "2001:db8::1");
    }

    #[test]
    fn test_trusted_proxy_headers_honored() {
        let trusted = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);
        let req = Request::builder()
            .header("x-forwarded-for", "198.51.100.20")
            .body(Body::empty())
            .unwrap();
        let req = with_peer(req, "10.1.2.3:5000");

        assert_eq!(extract_client_ip(&req, &trusted), "198.51.100.20");
    }

    #[test]
    fn test_untrusted_peer_headers_ignored() {
        let trusted = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);
        let req = Request::builder()
            .header("x-forwarded-for", "198.51.100.20")
            .body(Body::empty())
            .unwrap();
        let req = with_peer(req, "203.0.113.50:5000");

        assert_eq!(extract_client_ip(&req, &trusted), "203.0.113.50");
    }

    #[test]
    fn test_validation_without_peer_ignores_headers() {
        let trusted = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);
        let req = Request::builder()
            .header("x-forwarded-for", "198.51.100.20")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_client_ip(&req, &trusted), UNKNOWN_IP);
    }

    // ==========================================================================
    // CIDR Range Tests
    // ==========================================================================

    #[test]
    fn test_cidr_parse() {
        assert_eq!(CidrRange::parse("10.0.0.0/8").unwrap().prefix_len, 8);
        assert_eq!(CidrRange::parse("::1/128").unwrap().prefix_len, 128);
        assert_eq!(CidrRange::parse("192.168.1.1").unwrap().prefix_len, 32);
        assert!(CidrRange::parse("not-an-ip").is_none());
        assert!(CidrRange::parse("10.0.0.0/33").is_none());
        assert!(CidrRange::parse("10.0.0.0/x").is_none());
    }

    #[test]
    fn test_cidr_contains_ipv4() {
        let cidr = CidrRange::parse("192.168.1.0/24").unwrap();

        assert!(cidr.contains(&"192.168.1.1".parse().unwrap()));
        assert!(cidr.contains(&"192.168.1.254".parse().unwrap()));
        assert!(!cidr.contains(&"192.168.2.1".parse().unwrap()));
        assert!(!cidr.contains(&"::1".parse().unwrap()));
    }

    #[test]
    fn test_cidr_zero_prefix_matches_everything() {
        let cidr = CidrRange::parse("0.0.0.0/0").unwrap();
        assert!(cidr.contains(&"8.8.8.8".parse().unwrap()));

        let cidr6 = CidrRange::parse("::/0").unwrap();
        assert!(cidr6.contains(&"2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_trusted_proxy_config_skips_invalid() {
        let config = TrustedProxyConfig::new(&["bogus".to_string(), "172.16.0.0/12".to_string()]);
        assert!(config.is_enabled());
        assert!(config.is_trusted(&"172.31.255.255".parse().unwrap()));
        assert!(!config.is_trusted(&"8.8.8.8".parse().unwrap()));
    }
}
