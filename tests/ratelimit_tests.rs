//! Rate limiting scenarios through the full router, on a manual clock.
//!
//! Every request is driven with `tower::ServiceExt::oneshot`, so no sockets
//! are involved and time only moves when a test advances the clock.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use admission_gate::ratelimit::{
    EventKind, HeaderKeyResolver, IpKeyResolver, KeyResolver, ManualClock, RecordingSink,
};
use admission_gate::{AppState, Config, FailureMode, RateLimiter, build_router};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

const ORIGIN: i64 = ManualClock::DEFAULT_UNIX_ORIGIN;

/// Router, clock and event log for one test.
struct Harness {
    app: Router,
    clock: Arc<ManualClock>,
    sink: Arc<RecordingSink>,
    limiter: Arc<RateLimiter>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(Config::default(), Arc::new(IpKeyResolver::default()))
    }

    fn with_config(config: Config, key_resolver: Arc<dyn KeyResolver>) -> Self {
        let clock = Arc::new(ManualClock::new());
        let sink = Arc::new(RecordingSink::new());
        let limiter = Arc::new(
            RateLimiter::with_clock(config.rate_limit_settings(), clock.clone())
                .unwrap()
                .with_key_resolver(key_resolver)
                .with_sink(sink.clone()),
        );
        let app = build_router(AppState::with_limiter(config, Some(limiter.clone())));

        Self {
            app,
            clock,
            sink,
            limiter,
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    async fn get(&self, path: &str, caller: &str) -> (StatusCode, HeaderMap, Value) {
        self.send(
            Request::builder()
                .uri(path)
                .header("x-forwarded-for", caller)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn check_compliance(&self, caller: &str) -> (StatusCode, HeaderMap, Value) {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri("/check-compliance")
                .header("x-forwarded-for", caller)
                .header("content-type", "application/json")
                .body(Body::from(r#"{"aircraft_id":"ac-001"}"#))
                .unwrap(),
        )
        .await
    }
}

fn header(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .unwrap_or_else(|| panic!("missing {name}"))
        .to_str()
        .unwrap()
        .to_string()
}

const CALLER_A: &str = "198.51.100.10";
const CALLER_B: &str = "198.51.100.20";

// ============================================================================
// Burst, rejection and refill on /check-compliance (30 per 60s, burst 5)
// ============================================================================

#[tokio::test]
async fn test_burst_of_five_then_rejected() {
    let harness = Harness::new();

    for expected_remaining in (0..5).rev() {
        let (status, headers, _) = harness.check_compliance(CALLER_A).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(header(&headers, "x-ratelimit-limit"), "30");
        assert_eq!(
            header(&headers, "x-ratelimit-remaining"),
            expected_remaining.to_string()
        );
        assert_eq!(header(&headers, "x-ratelimit-window"), "60");
    }

    let (status, headers, body) = harness.check_compliance(CALLER_A).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    // 0.5 tokens per second: the next token is exactly 2s away
    assert_eq!(header(&headers, "retry-after"), "2");
    assert_eq!(header(&headers, "x-ratelimit-remaining"), "0");
    assert_eq!(header(&headers, "x-ratelimit-reset"), (ORIGIN + 2).to_string());
    assert_eq!(body["error"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(
        body["message"],
        "Rate limit exceeded. Maximum 30 requests per minute allowed."
    );
    assert_eq!(body["details"]["limit"], 30);
    assert_eq!(body["details"]["window"], 60);
    assert_eq!(body["details"]["retry_after"], 2);
    assert_eq!(body["details"]["reset_time"], ORIGIN + 2);

    let kinds = harness.sink.kinds();
    assert_eq!(kinds.len(), 6);
    assert_eq!(kinds[5], EventKind::Exceeded);
    assert!(kinds[..5].iter().all(|k| *k == EventKind::Allowed));
}

#[tokio::test]
async fn test_one_token_after_two_seconds() {
    let harness = Harness::new();
    for _ in 0..5 {
        harness.check_compliance(CALLER_A).await;
    }
    assert_eq!(
        harness.check_compliance(CALLER_A).await.0,
        StatusCode::TOO_MANY_REQUESTS
    );

    harness.clock.advance(Duration::from_secs(2));

    let (status, headers, body) = harness.check_compliance(CALLER_A).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header(&headers, "x-ratelimit-remaining"), "0");
    assert_eq!(body["aircraft_id"], "ac-001");

    assert_eq!(
        harness.check_compliance(CALLER_A).await.0,
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_refill_never_exceeds_burst() {
    let harness = Harness::new();
    harness.check_compliance(CALLER_A).await;

    harness.clock.advance(Duration::from_secs(3600));

    let (_, headers, _) = harness.check_compliance(CALLER_A).await;
    assert_eq!(header(&headers, "x-ratelimit-remaining"), "4");
}

// ============================================================================
// Key isolation
// ============================================================================

#[tokio::test]
async fn test_callers_are_independent() {
    let harness = Harness::new();
    for _ in 0..5 {
        harness.check_compliance(CALLER_A).await;
    }
    assert_eq!(
        harness.check_compliance(CALLER_A).await.0,
        StatusCode::TOO_MANY_REQUESTS
    );

    let (status, headers, _) = harness.check_compliance(CALLER_B).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header(&headers, "x-ratelimit-remaining"), "4");
}

#[tokio::test]
async fn test_paths_are_independent() {
    let harness = Harness::new();
    for _ in 0..5 {
        harness.check_compliance(CALLER_A).await;
    }

    let (status, headers, _) = harness.get("/aircraft/ac-001", CALLER_A).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header(&headers, "x-ratelimit-limit"), "120");
    assert_eq!(header(&headers, "x-ratelimit-remaining"), "19");

    let registry = harness.limiter.registry();
    assert!(registry.contains(&format!("ip:{CALLER_A}:/check-compliance")));
    assert!(registry.contains(&format!("ip:{CALLER_A}:/aircraft/ac-001")));
}

#[tokio::test]
async fn test_tenants_are_independent() {
    let harness = Harness::with_config(Config::default(), Arc::new(HeaderKeyResolver::tenant()));
    let tenant = |id: &str| {
        Request::builder()
            .uri("/regulations/far-25")
            .header("x-tenant-id", id)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..20 {
        assert_eq!(harness.send(tenant("acme")).await.0, StatusCode::OK);
    }
    assert_eq!(
        harness.send(tenant("acme")).await.0,
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(harness.send(tenant("globex")).await.0, StatusCode::OK);
    assert!(
        harness
            .limiter
            .registry()
            .contains("tenant:globex:/regulations/far-25")
    );
}

// ============================================================================
// Bypass
// ============================================================================

#[tokio::test]
async fn test_docs_excluded() {
    let harness = Harness::new();

    for path in ["/docs", "/openapi.json", "/redoc"] {
        for _ in 0..50 {
            let (status, headers, _) = harness.get(path, CALLER_A).await;
            assert_eq!(status, StatusCode::OK);
            assert!(headers.get("x-ratelimit-limit").is_none());
        }
    }

    assert!(harness.limiter.registry().is_empty());
    assert!(harness.sink.events().is_empty());
}

#[tokio::test]
async fn test_disabled_policy_bypasses() {
    let harness = Harness::new();

    for _ in 0..100 {
        let (status, headers, _) = harness.get("/health", CALLER_A).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get("x-ratelimit-remaining").is_none());
        assert!(headers.get("retry-after").is_none());
    }

    assert!(harness.limiter.registry().is_empty());
}

#[tokio::test]
async fn test_unrouted_path_uses_default_policy() {
    let harness = Harness::new();

    let (status, headers, _) = harness.get("/unknown", CALLER_A).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(header(&headers, "x-ratelimit-limit"), "60");
    assert_eq!(header(&headers, "x-ratelimit-remaining"), "9");
}

// ============================================================================
// Header determinism
// ============================================================================

#[tokio::test]
async fn test_headers_are_deterministic() {
    async fn trace(harness: &Harness) -> Vec<(StatusCode, String, String, Option<String>)> {
        let mut out = Vec::new();
        for step in 0..8 {
            if step == 6 {
                harness.clock.advance(Duration::from_millis(4500));
            }
            let (status, headers, _) = harness.check_compliance(CALLER_A).await;
            out.push((
                status,
                header(&headers, "x-ratelimit-remaining"),
                header(&headers, "x-ratelimit-reset"),
                headers
                    .get("retry-after")
                    .map(|v| v.to_str().unwrap().to_string()),
            ));
        }
        out
    }

    let first = trace(&Harness::new()).await;
    let second = trace(&Harness::new()).await;

    assert_eq!(first, second);
    // 4.5s refills 2.25 tokens: two more requests pass
    assert_eq!(first[6].0, StatusCode::OK);
    assert_eq!(first[7].0, StatusCode::OK);
}

// ============================================================================
// Faults
// ============================================================================

#[tokio::test]
async fn test_missing_identity_fails_open() {
    let harness = Harness::with_config(Config::default(), Arc::new(HeaderKeyResolver::api_key()));

    let (status, headers, body) = harness
        .send(Request::builder().uri("/aircraft/ac-003").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "ac-003");
    assert!(headers.get("x-ratelimit-limit").is_none());
    assert_eq!(harness.sink.kinds(), vec![EventKind::LimiterFault]);
    assert!(harness.limiter.registry().is_empty());
}

#[tokio::test]
async fn test_missing_identity_fails_closed() {
    let config = Config {
        rate_limit_failure_mode: FailureMode::Closed,
        ..Config::default()
    };
    let harness = Harness::with_config(config, Arc::new(HeaderKeyResolver::api_key()));

    let (status, _, body) = harness
        .send(Request::builder().uri("/aircraft/ac-003").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "RATE_LIMITER_UNAVAILABLE");
}

#[tokio::test]
async fn test_api_key_falls_back_to_ip() {
    let resolver = HeaderKeyResolver::api_key().with_ip_fallback(IpKeyResolver::default());
    let harness = Harness::with_config(Config::default(), Arc::new(resolver));

    let (status, _, _) = harness.get("/aircraft/ac-001", CALLER_A).await;

    assert_eq!(status, StatusCode::OK);
    assert!(
        harness
            .limiter
            .registry()
            .contains(&format!("ip:{CALLER_A}:/aircraft/ac-001"))
    );
}

// ============================================================================
// Idle cleanup
// ============================================================================

#[tokio::test]
async fn test_idle_buckets_are_swept_after_requests() {
    let config = Config {
        rate_limit_cleanup_interval: Duration::from_secs(60),
        rate_limit_idle_threshold: Duration::from_secs(120),
        ..Config::default()
    };
    let harness = Harness::with_config(config, Arc::new(IpKeyResolver::default()));

    harness.get("/aircraft/ac-001", CALLER_A).await;
    harness.clock.advance(Duration::from_secs(121));
    harness.get("/aircraft/ac-001", CALLER_B).await;

    let registry = harness.limiter.registry();
    assert_eq!(registry.len(), 1);
    assert!(!registry.contains(&format!("ip:{CALLER_A}:/aircraft/ac-001")));
    assert!(registry.contains(&format!("ip:{CALLER_B}:/aircraft/ac-001")));
}

#[tokio::test]
async fn test_sweep_waits_for_interval() {
    let config = Config {
        rate_limit_cleanup_interval: Duration::from_secs(600),
        rate_limit_idle_threshold: Duration::from_secs(10),
        ..Config::default()
    };
    let harness = Harness::with_config(config, Arc::new(IpKeyResolver::default()));

    harness.get("/aircraft/ac-001", CALLER_A).await;
    harness.clock.advance(Duration::from_secs(30));
    harness.get("/aircraft/ac-001", CALLER_B).await;

    // Idle long enough, but the sweep interval has not elapsed
    assert_eq!(harness.limiter.registry().len(), 2);
}
