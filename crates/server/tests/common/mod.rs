//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a mock job service injected into the orchestrator, plus a stub
//! analysis backend on an ephemeral port for the pass-through proxy.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Path;
use axum::http::{header, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use syllabus_core::{
    testing::MockJobService, BackendConfig, Config, OrchestratorConfig, SessionOrchestrator,
    SessionState, ServerConfig,
};
use syllabus_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use syllabus_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_submit() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/session/submit", json!({
///         "url": "https://example.edu/syllabi/"
///     })).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock backend used by the orchestrator
    pub service: Arc<MockJobService>,
    /// The orchestrator behind the session API
    pub orchestrator: SessionOrchestrator,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
    pub raw: Vec<u8>,
}

impl TestFixture {
    /// Create a fixture whose proxy points at an unreachable backend.
    pub async fn new() -> Self {
        Self::with_backend_url("http://127.0.0.1:9").await
    }

    /// Create a fixture whose proxy forwards to `backend_url`.
    pub async fn with_backend_url(backend_url: &str) -> Self {
        let service = Arc::new(MockJobService::new());

        let config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
                ..Default::default()
            },
            backend: BackendConfig {
                url: backend_url.to_string(),
                request_timeout_secs: 5,
            },
            orchestrator: OrchestratorConfig {
                job_poll_interval_ms: 20,
                match_poll_interval_ms: 20,
                extraction_start_timeout_ms: 1000,
            },
        };

        let orchestrator =
            SessionOrchestrator::new(config.orchestrator.clone(), service.clone());
        let state = Arc::new(
            AppState::new(config, orchestrator.clone()).expect("Failed to create app state"),
        );
        let router = create_router(state);

        Self {
            router,
            service,
            orchestrator,
        }
    }

    /// Wait until the session satisfies `predicate`.
    pub async fn wait_for(&self, predicate: impl Fn(&SessionState) -> bool) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_secs(3) {
            if predicate(&self.orchestrator.state()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
            raw: body_bytes.to_vec(),
        }
    }
}

/// Start a stub analysis backend on an ephemeral port and return its base URL.
pub async fn spawn_stub_backend() -> String {
    let app = Router::new()
        .route("/api/jobs", get(stub_jobs))
        .route("/api/discover-syllabi", post(stub_discover))
        .route("/api/job-status/{job_id}", get(stub_job_status))
        .route("/api/results/{job_id}", get(stub_results))
        .route("/api/check-primo/{job_id}", post(stub_check_primo))
        .route("/api/download-csv/{job_id}", get(stub_download_csv));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub backend");
    let addr = listener.local_addr().expect("Failed to read stub address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    format!("http://{}", addr)
}

async fn stub_jobs() -> Json<Value> {
    Json(json!({
        "jobs": [{
            "job_id": "J1",
            "status": "completed",
            "progress": 100,
            "message": "Download complete! Found 3 PDFs",
            "url": "https://example.edu/syllabi/",
            "job_name": "Fall syllabi",
            "created_at": "2024-09-01T10:00:00"
        }]
    }))
}

/// Echo the request so tests can check what was forwarded.
async fn stub_discover(headers: axum::http::HeaderMap, body: String) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    Json(json!({
        "job_id": "J1",
        "status": "started",
        "received_body": body,
        "received_content_type": content_type,
    }))
}

async fn stub_job_status(Path(job_id): Path<String>) -> impl IntoResponse {
    if job_id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "Job not found" })),
        )
            .into_response();
    }
    Json(json!({
        "job_id": job_id,
        "status": "processing",
        "progress": 45,
        "message": "Checking resources for BIO101.pdf (1/2)",
    }))
    .into_response()
}

async fn stub_results(Path(_job_id): Path<String>) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": "Results not found" })),
    )
}

async fn stub_check_primo(Path(_job_id): Path<String>) -> impl IntoResponse {
    Json(json!({ "status": "already_running", "message": "Primo checking already in progress" }))
}

async fn stub_download_csv(Path(job_id): Path<String>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"syllabus_analysis_{}.csv\"", job_id),
            ),
        ],
        "filename,class_name\nBIO101.pdf,Introduction to Botany\n",
    )
}
