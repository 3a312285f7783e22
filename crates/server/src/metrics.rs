//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the syllabus analyzer server:
//! - HTTP request metrics (latency, counts, in flight)
//! - Proxy failures reaching the analysis backend
//! - Session state (collected dynamically)
//!
//! Backend call and orchestrator metrics live in `syllabus_core::metrics` and
//! are registered here as well.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;

use syllabus_core::PollKind;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "syllabus_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("syllabus_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "syllabus_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Proxy Metrics
// =============================================================================

/// Proxied requests that never got an answer from the backend.
pub static PROXY_UPSTREAM_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "syllabus_proxy_upstream_failures_total",
            "Proxied requests that failed to reach the analysis backend",
        ),
        &["path"],
    )
    .unwrap()
});

// =============================================================================
// Session Metrics
// =============================================================================

/// Current session step (1 for the active step, collected dynamically).
pub static SESSION_STEP: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("syllabus_session_step", "Current session step"),
        &["step"],
    )
    .unwrap()
});

/// Background tasks running by kind (collected dynamically).
pub static SESSION_POLLS_ACTIVE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "syllabus_session_polls_active",
            "Background polling tasks currently running",
        ),
        &["kind"],
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    registry
        .register(Box::new(PROXY_UPSTREAM_FAILURES.clone()))
        .unwrap();

    registry.register(Box::new(SESSION_STEP.clone())).unwrap();
    registry
        .register(Box::new(SESSION_POLLS_ACTIVE.clone()))
        .unwrap();

    for metric in syllabus_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Refresh gauges derived from the session before a scrape.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let view = state.orchestrator().view();

    for step in ["upload", "download", "metadata", "extract", "results"] {
        let active = i64::from(view.state.step.as_str() == step);
        SESSION_STEP.with_label_values(&[step]).set(active);
    }

    for kind in [
        PollKind::JobStatus,
        PollKind::CatalogMatch,
        PollKind::ResultsRefresh,
    ] {
        let running = i64::from(view.polling.contains(&kind));
        SESSION_POLLS_ACTIVE
            .with_label_values(&[kind.as_str()])
            .set(running);
    }
}

static JOB_ID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"/(job-status|results|check-primo|download-results|download-csv)/[^/]+",
    )
    .unwrap()
});

static FIELD_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/session/fields/[^/]+/toggle").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = JOB_ID_SEGMENT.replace_all(path, "/$1/{id}");
    let result = FIELD_SEGMENT.replace_all(&result, "/session/fields/{id}/toggle");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_job_id() {
        assert_eq!(
            normalize_path("/api/job-status/3f2a9c1e-77aa-4c1b-9a55-0d1f3e6b2c10"),
            "/api/job-status/{id}"
        );
        assert_eq!(
            normalize_path("/api/download-csv/job_20240101"),
            "/api/download-csv/{id}"
        );
        assert_eq!(normalize_path("/api/check-primo/J1"), "/api/check-primo/{id}");
    }

    #[test]
    fn test_normalize_path_field_toggle() {
        assert_eq!(
            normalize_path("/api/session/fields/reading_materials/toggle"),
            "/api/session/fields/{id}/toggle"
        );
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/metadata-fields"), "/api/metadata-fields");
        assert_eq!(normalize_path("/health"), "/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("syllabus_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        syllabus_core::metrics::POLL_TICKS
            .with_label_values(&["job_status"])
            .inc();
        PROXY_UPSTREAM_FAILURES
            .with_label_values(&["/api/jobs"])
            .inc();
        HTTP_REQUESTS_IN_FLIGHT.set(0);

        let output = encode_metrics();
        assert!(output.contains("syllabus_poll_ticks_total"));
        assert!(output.contains("syllabus_proxy_upstream_failures_total"));
        assert!(output.contains("syllabus_http_requests_in_flight"));
    }
}
