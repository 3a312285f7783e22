//! Session API handlers.
//!
//! Expose the orchestrator's operations to the browser UI. Every successful
//! mutation answers with the full session view.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use syllabus_core::{ErrorKind, JobSummary, MetadataField, OrchestratorError, SessionView};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a source URL
#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub url: String,
    /// Optional human-readable name for the job
    pub job_name: Option<String>,
}

/// Request body for replacing the field selection
#[derive(Debug, Deserialize)]
pub struct SelectFieldsBody {
    pub fields: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FieldsResponse {
    pub fields: Vec<MetadataField>,
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<JobSummary>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

/// Orchestrator error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::InvalidStep => StatusCode::CONFLICT,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Transport | ErrorKind::Upstream | ErrorKind::JobFailed => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0.to_step_error();
        (
            status_for(error.kind),
            Json(ErrorResponse {
                error: error.message,
                kind: error.kind,
            }),
        )
            .into_response()
    }
}

type SessionResult = Result<Json<SessionView>, ApiError>;

// ============================================================================
// Handlers
// ============================================================================

/// Get the current session
pub async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(state.orchestrator().view())
}

/// Submit a source URL
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitBody>,
) -> SessionResult {
    let view = state.orchestrator().submit(&body.url, body.job_name).await?;
    Ok(Json(view))
}

/// Continue from a finished download to field selection
pub async fn confirm_download(State(state): State<Arc<AppState>>) -> SessionResult {
    Ok(Json(state.orchestrator().confirm_download()?))
}

/// Replace the selected fields
pub async fn select_fields(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SelectFieldsBody>,
) -> SessionResult {
    let fields = body.fields.into_iter().collect();
    Ok(Json(state.orchestrator().select_fields(fields)?))
}

/// Toggle one field
pub async fn toggle_field(
    State(state): State<Arc<AppState>>,
    Path(field_id): Path<String>,
) -> SessionResult {
    Ok(Json(state.orchestrator().toggle_field(&field_id)?))
}

/// Start metadata extraction
pub async fn start_extraction(State(state): State<Arc<AppState>>) -> SessionResult {
    Ok(Json(state.orchestrator().start_extraction().await?))
}

/// Reload results from the backend
pub async fn reload_results(State(state): State<Arc<AppState>>) -> SessionResult {
    Ok(Json(state.orchestrator().reload_results().await?))
}

/// Retry library matching
pub async fn retry_matching(State(state): State<Arc<AppState>>) -> SessionResult {
    Ok(Json(state.orchestrator().retry_matching()?))
}

/// Start over
pub async fn reset(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(state.orchestrator().reset())
}

/// Metadata fields the backend can extract
pub async fn metadata_fields(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FieldsResponse>, ApiError> {
    let fields = state.orchestrator().metadata_fields().await?;
    Ok(Json(FieldsResponse { fields }))
}

/// Jobs known to the backend
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JobsResponse>, ApiError> {
    let jobs = state.orchestrator().list_jobs().await?;
    Ok(Json(JobsResponse { jobs }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::InvalidStep), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Upstream), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::Transport), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_timeout_error_response() {
        let response =
            ApiError(OrchestratorError::Timeout(Duration::from_secs(120))).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
