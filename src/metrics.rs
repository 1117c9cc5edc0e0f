//! Prometheus metrics for admission control.
//!
//! Metrics are exposed via a dedicated HTTP listener (default: `0.0.0.0:9090`).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `admission_decisions_total` - Limiter events (label: `outcome`)
//! - `admission_sweeps_total` - Idle-bucket sweeps performed
//! - `admission_evicted_buckets_total` - Buckets removed by sweeps
//! - `admission_sink_failures_total` - Events an observability sink failed to take
//! - `admission_limiter_faults_total` - Requests the limiter could not decide (label: `mode`)
//!
//! ## Gauges
//! - `admission_bucket_count` - Buckets currently tracked
//!
//! Recording functions are no-ops until [`init_metrics`] installs a recorder,
//! so the limiter can call them unconditionally.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

use crate::ratelimit::EventKind;

/// Metric names as constants for consistency.
pub mod names {
    pub const DECISIONS_TOTAL: &str = "admission_decisions_total";
    pub const SWEEPS_TOTAL: &str = "admission_sweeps_total";
    pub const EVICTED_BUCKETS_TOTAL: &str = "admission_evicted_buckets_total";
    pub const SINK_FAILURES_TOTAL: &str = "admission_sink_failures_total";
    pub const LIMITER_FAULTS_TOTAL: &str = "admission_limiter_faults_total";
    pub const BUCKET_COUNT: &str = "admission_bucket_count";
}

/// Install the Prometheus exporter and describe all metrics.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::DECISIONS_TOTAL,
        "Admission decisions and limiter events by outcome"
    );
    describe_counter!(names::SWEEPS_TOTAL, "Idle token bucket sweeps performed");
    describe_counter!(
        names::EVICTED_BUCKETS_TOTAL,
        "Token buckets evicted by idle sweeps"
    );
    describe_counter!(
        names::SINK_FAILURES_TOTAL,
        "Limiter events dropped because the observability sink failed"
    );
    describe_counter!(
        names::LIMITER_FAULTS_TOTAL,
        "Requests the rate limiter could not decide, by failure mode"
    );
    describe_gauge!(names::BUCKET_COUNT, "Token buckets currently tracked");

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Count one limiter event.
pub fn record_decision(kind: EventKind) {
    counter!(names::DECISIONS_TOTAL, "outcome" => kind.name()).increment(1);
}

/// Record a completed sweep and the resulting registry size.
pub fn record_sweep(evicted: usize, remaining: usize) {
    counter!(names::SWEEPS_TOTAL).increment(1);
    counter!(names::EVICTED_BUCKETS_TOTAL).increment(evicted as u64);
    set_bucket_count(remaining);
}

/// Count a limiter fault. Recorded by the limiter itself, whatever the sink.
pub fn record_limiter_fault(mode: &'static str) {
    counter!(names::LIMITER_FAULTS_TOTAL, "mode" => mode).increment(1);
}

pub fn record_sink_failure() {
    counter!(names::SINK_FAILURES_TOTAL).increment(1);
}

pub fn set_bucket_count(count: usize) {
    gauge!(names::BUCKET_COUNT).set(count as f64);
}
