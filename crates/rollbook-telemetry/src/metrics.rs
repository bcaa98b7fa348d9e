//! Prometheus metrics for Rollbook.
//!
//! The recorder is installed once per process. The server renders the
//! collected metrics on `GET /metrics` through [`render_metrics`].
//!
//! Recording functions are safe to call before (or without) initialization;
//! the `metrics` facade drops the samples.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const REQUESTS_TOTAL: &str = "rollbook_requests_total";
const REQUEST_DURATION: &str = "rollbook_request_duration_seconds";
const AUTHZ_CHECKS_TOTAL: &str = "rollbook_authz_checks_total";
const RESOURCE_CACHE_TOTAL: &str = "rollbook_resource_cache_total";
const GRADE_SUBMISSIONS_TOTAL: &str = "rollbook_grade_submissions_total";
const GRADE_LOCK_CONTENTION_TOTAL: &str = "rollbook_grade_lock_contention_total";
const GRADE_JOBS_IN_FLIGHT: &str = "rollbook_grade_jobs_in_flight";

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Histogram buckets for request duration.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // 1ms .. 10s
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

impl MetricsConfig {
    /// Metrics turned off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Initializes the metrics subsystem.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if the recorder cannot be installed,
/// for example because another recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();

    Ok(())
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(REQUESTS_TOTAL, "Total number of HTTP requests handled");
    describe_histogram!(REQUEST_DURATION, "HTTP request duration in seconds");
    describe_counter!(
        AUTHZ_CHECKS_TOTAL,
        "Authorization decisions by resource kind and result"
    );
    describe_counter!(
        RESOURCE_CACHE_TOTAL,
        "LMS resource cache lookups by bucket and result"
    );
    describe_counter!(GRADE_SUBMISSIONS_TOTAL, "Grade sync job outcomes");
    describe_counter!(
        GRADE_LOCK_CONTENTION_TOTAL,
        "Grade lock acquisitions that timed out"
    );
    describe_gauge!(GRADE_JOBS_IN_FLIGHT, "Grade sync jobs currently running");
}

/// Records a handled HTTP request.
pub fn record_request(route: &str, status_code: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "route" => route.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(REQUEST_DURATION, "route" => route.to_string()).record(duration.as_secs_f64());
}

/// Records an authorization decision.
///
/// `result` is one of `"cached"`, `"remote"` or `"denied"`.
pub fn record_authz_check(kind: &str, result: &'static str) {
    counter!(
        AUTHZ_CHECKS_TOTAL,
        "kind" => kind.to_string(),
        "result" => result
    )
    .increment(1);
}

/// Records a resource cache lookup.
pub fn record_cache_lookup(bucket: &str, hit: bool) {
    counter!(
        RESOURCE_CACHE_TOTAL,
        "bucket" => bucket.to_string(),
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// Records the final outcome of a grade sync job.
///
/// `outcome` is one of `"submitted"`, `"skipped"`, `"failed"` or `"exhausted"`.
pub fn record_grade_submission(outcome: &'static str) {
    counter!(GRADE_SUBMISSIONS_TOTAL, "outcome" => outcome).increment(1);
}

/// Records a grade lock acquisition timeout.
pub fn record_lock_contention() {
    counter!(GRADE_LOCK_CONTENTION_TOTAL).increment(1);
}

/// Guard that tracks a running grade sync job.
///
/// Increments the in-flight gauge on creation and decrements it on drop, so
/// the gauge stays correct even when a job panics.
pub struct JobInFlightGuard {
    _private: (),
}

impl JobInFlightGuard {
    /// Creates a new guard and increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(GRADE_JOBS_IN_FLIGHT).increment(1.0);
        Self { _private: () }
    }
}

impl Default for JobInFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for JobInFlightGuard {
    fn drop(&mut self) {
        gauge!(GRADE_JOBS_IN_FLIGHT).decrement(1.0);
    }
}
