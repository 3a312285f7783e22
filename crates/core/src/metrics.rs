//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Backend (job service) calls
//! - Orchestrator polling and step transitions

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Backend Metrics
// =============================================================================

/// Backend requests total by operation and outcome.
pub static BACKEND_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "syllabus_backend_requests_total",
            "Total requests sent to the analysis backend",
        ),
        &["operation", "outcome"], // outcome: "success", "error", "transport_error"
    )
    .unwrap()
});

/// Backend request duration in seconds.
pub static BACKEND_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "syllabus_backend_request_duration_seconds",
            "Duration of analysis backend calls",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0]),
        &["operation"],
    )
    .unwrap()
});

// =============================================================================
// Orchestrator Metrics
// =============================================================================

/// Poll ticks by poll kind.
pub static POLL_TICKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("syllabus_poll_ticks_total", "Status polls issued"),
        &["kind"],
    )
    .unwrap()
});

/// Session step transitions.
pub static STEP_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "syllabus_step_transitions_total",
            "Session step transitions",
        ),
        &["from_step", "to_step"],
    )
    .unwrap()
});

/// Errors surfaced to the user by kind.
pub static SESSION_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("syllabus_session_errors_total", "Errors surfaced to the user"),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(BACKEND_REQUESTS.clone()),
        Box::new(BACKEND_REQUEST_DURATION.clone()),
        Box::new(POLL_TICKS.clone()),
        Box::new(STEP_TRANSITIONS.clone()),
        Box::new(SESSION_ERRORS.clone()),
    ]
}
