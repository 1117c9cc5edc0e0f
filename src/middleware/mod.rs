//! HTTP middleware.
//!
//! - **Rate Limiting**: token-bucket admission control per caller and path
//! - **Client IP Extraction**: forwarded headers, socket peer, trusted proxies
//!
//! # Architecture
//!
//! ```text
//! Request → Rate Limiter → Trace → CORS → Handler → Response
//!              ↓
//!          429 Too Many Requests (+ Retry-After)
//! ```

pub mod ip;
pub mod rate_limit;

pub use ip::{CidrRange, TrustedProxyConfig, UNKNOWN_IP, extract_client_ip};
pub use rate_limit::{RateLimitLayer, RateLimitService};
