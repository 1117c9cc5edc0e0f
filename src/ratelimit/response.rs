//! Rate-limit response headers and the 429 / 503 bodies.
//!
//! # Headers
//!
//! Attached to every checked request (allowed or rejected):
//!
//! | Header                  | Value                                         |
//! |-------------------------|-----------------------------------------------|
//! | `X-RateLimit-Limit`     | `requests_per_window` of the matched policy   |
//! | `X-RateLimit-Remaining` | `floor(tokens)` after the decision            |
//! | `X-RateLimit-Reset`     | Unix seconds: now + time to the next token    |
//! | `X-RateLimit-Window`    | `window_seconds` of the matched policy        |
//! | `Retry-After`           | rejections only: `max(1, ceil(wait))` seconds |

use axum::Json;
use axum::body::Body;
use axum::http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use serde::Serialize;

use super::bucket::BucketSnapshot;
use super::policy::RateLimitConfig;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const X_RATELIMIT_WINDOW: HeaderName = HeaderName::from_static("x-ratelimit-window");

/// Error code in the 429 body.
pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";

/// Error code in the 503 body returned by a fail-closed limiter fault.
pub const RATE_LIMITER_UNAVAILABLE: &str = "RATE_LIMITER_UNAVAILABLE";

/// Header values describing one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u64,
    /// Absolute Unix timestamp in seconds.
    pub reset: i64,
    pub window: u32,
    /// Whole seconds to wait before retrying, at least 1.
    pub retry_after: u64,
}

impl RateLimitHeaders {
    /// Derive header values from a bucket snapshot.
    ///
    /// A bucket that never refills has no "next token"; the policy window is
    /// reported as the wait instead.
    pub fn from_snapshot(policy: &RateLimitConfig, snapshot: &BucketSnapshot, unix_now: i64) -> Self {
        let wait = snapshot
            .seconds_until_next_token
            .unwrap_or_else(|| f64::from(policy.window_seconds));
        // `wait` is finite and non-negative; the cast saturates regardless.
        let wait_secs = wait.ceil() as u64;

        Self {
            limit: policy.requests_per_window,
            remaining: snapshot.available,
            reset: unix_now.saturating_add(i64::try_from(wait_secs).unwrap_or(i64::MAX)),
            window: policy.window_seconds,
            retry_after: wait_secs.max(1),
        }
    }

    /// Insert the standard rate-limit headers (without `Retry-After`).
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset));
        headers.insert(X_RATELIMIT_WINDOW, HeaderValue::from(self.window));
    }

    /// Build the 429 response for a rejected request.
    pub fn rejection_response(&self) -> Response<Body> {
        let body = RateLimitErrorBody {
            error: RATE_LIMIT_EXCEEDED,
            message: format!(
                "Rate limit exceeded. Maximum {} requests per {} allowed.",
                self.limit,
                window_phrase(self.window)
            ),
            details: RateLimitErrorDetails {
                limit: self.limit,
                window: self.window,
                reset_time: self.reset,
                retry_after: self.retry_after,
            },
        };

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        self.apply(headers);
        headers.insert(RETRY_AFTER, HeaderValue::from(self.retry_after));
        response
    }
}

fn window_phrase(window: u32) -> String {
    match window {
        1 => "second".to_string(),
        60 => "minute".to_string(),
        3600 => "hour".to_string(),
        n => format!("{n} seconds"),
    }
}

/// JSON body of a 429 response.
#[derive(Debug, Serialize)]
pub struct RateLimitErrorBody {
    pub error: &'static str,
    pub message: String,
    pub details: RateLimitErrorDetails,
}

#[derive(Debug, Serialize)]
pub struct RateLimitErrorDetails {
    pub limit: u32,
    pub window: u32,
    pub reset_time: i64,
    pub retry_after: u64,
}

#[derive(Debug, Serialize)]
struct UnavailableBody {
    error: &'static str,
    message: &'static str,
}

/// 503 returned when the limiter faults and is configured to fail closed.
pub fn unavailable_response() -> Response<Body> {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(UnavailableBody {
            error: RATE_LIMITER_UNAVAILABLE,
            message: "Request admission is temporarily unavailable. Please try again later.",
        }),
    )
        .into_response()
}
