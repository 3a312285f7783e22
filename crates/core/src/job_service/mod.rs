//! Client side of the analysis backend ("job service").
//!
//! The backend owns discovery, download, extraction and catalog matching.
//! This module defines the contract the orchestrator depends on and an HTTP
//! implementation of it.

mod http;
mod types;

pub use http::HttpJobService;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when talking to the job service.
#[derive(Debug, Error)]
pub enum JobServiceError {
    /// The request never produced a response (connection refused, DNS, timeout).
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("{}", upstream_message(.status, .detail.as_deref(), .body))]
    Upstream {
        status: u16,
        /// Structured error detail, when the body could be parsed.
        detail: Option<String>,
        /// Raw response body.
        body: String,
    },

    /// Failed to parse a successful response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl JobServiceError {
    /// Build an upstream error from a non-2xx status and its body.
    ///
    /// The body is parsed as structured JSON (`detail`, `error` or `message`)
    /// when possible; otherwise only the raw text is kept.
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let detail = parse_error_detail(&body);
        Self::Upstream {
            status,
            detail,
            body,
        }
    }

    /// True when the request never reached the backend or got no answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::HttpError(_))
    }

    /// True when the request gave up waiting for the backend.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::HttpError(e) if e.is_timeout())
    }
}

fn upstream_message(status: &u16, detail: Option<&str>, body: &str) -> String {
    match detail {
        Some(detail) => detail.to_string(),
        None => format!("Server error ({}): {}", status, body),
    }
}

/// Extract a human-readable error detail from a JSON error body.
fn parse_error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    for key in ["detail", "error", "message"] {
        match object.get(key) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            // FastAPI validation errors: [{"loc": [...], "msg": "...", ...}]
            Some(serde_json::Value::Array(items)) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect();
                if !messages.is_empty() {
                    return Some(messages.join("; "));
                }
            }
            _ => {}
        }
    }

    None
}

/// Contract of the analysis backend as consumed by the orchestrator.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Create a discovery/download job for a source URL.
    async fn create_job(
        &self,
        request: &CreateJobRequest,
    ) -> Result<CreateJobResponse, JobServiceError>;

    /// Fetch the current record of a job.
    async fn job_status(&self, job_id: &str) -> Result<Job, JobServiceError>;

    /// List the metadata fields the backend can extract.
    async fn metadata_fields(&self) -> Result<Vec<MetadataField>, JobServiceError>;

    /// List all jobs known to the backend.
    async fn list_jobs(&self) -> Result<Vec<JobSummary>, JobServiceError>;

    /// Start metadata extraction for a downloaded job.
    async fn start_extraction(
        &self,
        request: &ExtractionRequest,
    ) -> Result<Acknowledgement, JobServiceError>;

    /// Fetch extraction results (with library matches once available).
    async fn results(&self, job_id: &str) -> Result<Vec<ExtractedMetadata>, JobServiceError>;

    /// Start asynchronous catalog matching of the job's reading materials.
    async fn start_catalog_match(&self, job_id: &str) -> Result<Acknowledgement, JobServiceError>;
}
