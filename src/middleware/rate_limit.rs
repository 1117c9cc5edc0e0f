//! Tower middleware enforcing [`RateLimiter`] decisions.
//!
//! # Request Flow
//!
//! 1. [`RateLimiter::check`] runs synchronously in `call`, before the request
//!    is moved into the response future.
//! 2. Allowed requests are forwarded; the rate-limit headers are added to the
//!    handler's response. Errors from the inner service are logged with the
//!    decision context and returned unchanged.
//! 3. Rejected requests get a 429 and never reach the inner service.
//! 4. Bypassed requests (excluded path, disabled policy) are forwarded
//!    untouched, without headers.
//! 5. Limiter faults fail open (forward, no headers) or closed (503).
//! 6. Every non-bypassed request ends with an opportunistic idle-bucket sweep.
//!
//! # Response Headers
//!
//! - `X-RateLimit-Limit`, `X-RateLimit-Remaining`, `X-RateLimit-Reset`,
//!   `X-RateLimit-Window` on every checked request
//! - `Retry-After` on 429 responses

use std::fmt::Display;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};

use crate::ratelimit::response::unavailable_response;
use crate::ratelimit::{Decision, FailureMode, RateLimiter};

/// Rate limiting layer for the Tower middleware stack.
///
/// All services built from one layer share the limiter and its buckets.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = RateLimiter::new(RateLimitSettings::default())?;
/// let app = Router::new()
///     .route("/check-compliance", post(handler))
///     .layer(RateLimitLayer::new(Arc::new(limiter)));
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Display,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        // Take the service that was driven to readiness, leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        // Decide before moving `req` into the future.
        let decision = limiter.check(&req);

        Box::pin(async move {
            let result = match decision {
                Decision::Bypass(_) => return inner.call(req).await,
                Decision::Fault {
                    mode: FailureMode::Open,
                    ..
                } => inner.call(req).await,
                Decision::Fault {
                    mode: FailureMode::Closed,
                    ..
                } => Ok(unavailable_response()),
                Decision::Rejected(admission) => Ok(admission.headers.rejection_response()),
                Decision::Allowed(admission) => match inner.call(req).await {
                    Ok(mut response) => {
                        admission.headers.apply(response.headers_mut());
                        Ok(response)
                    }
                    Err(e) => {
                        limiter.record_downstream_error(&admission, &e.to_string());
                        Err(e)
                    }
                },
            };

            limiter.maybe_cleanup();
            result
        })
    }
}
