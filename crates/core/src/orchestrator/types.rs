//! Types for the session orchestrator.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job_service::{
    ExtractedMetadata, Job, JobServiceError, JobStatus, READING_MATERIALS_FIELD,
};

/// Step of the analysis workflow shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Upload,
    Download,
    Metadata,
    Extract,
    Results,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Metadata => "metadata",
            Self::Extract => "extract",
            Self::Results => "results",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of an error surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected locally before any network call.
    Validation,
    /// The backend could not be reached.
    Transport,
    /// The backend did not answer in time.
    Timeout,
    /// The backend answered with an error status.
    Upstream,
    /// The job itself reported a failure.
    JobFailed,
    /// The operation is not available in the current step.
    InvalidStep,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Upstream => "upstream",
            Self::JobFailed => "job_failed",
            Self::InvalidStep => "invalid_step",
        }
    }
}

/// Error attached to the session, shown in the current step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Error for a job that reported `error` or `failed`; the job's message is kept verbatim.
    pub fn job_failed(job: &Job) -> Self {
        let message = if job.message.is_empty() {
            format!("Job {} {}", job.job_id, job.status.as_str())
        } else {
            job.message.clone()
        };
        Self::new(ErrorKind::JobFailed, message)
    }

    pub fn from_service(err: &JobServiceError) -> Self {
        match err {
            JobServiceError::HttpError(e) if e.is_timeout() => Self::new(
                ErrorKind::Timeout,
                format!("The analysis server did not respond in time: {}", e),
            ),
            JobServiceError::HttpError(e) => Self::new(
                ErrorKind::Transport,
                format!("Failed to reach the analysis server: {}", e),
            ),
            other => Self::new(ErrorKind::Upstream, other.to_string()),
        }
    }
}

/// Catalog-matching sub-state of the results step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MatchingStatus {
    #[default]
    Idle,
    /// Start call issued, not yet acknowledged.
    Starting,
    /// Backend accepted the request; progress is observed by polling.
    Matching {
        progress: u32,
        message: String,
        /// Set once a poll showed catalog-matching activity. Until then a
        /// `completed` status still belongs to the extraction run.
        observed_activity: bool,
    },
    Matched,
    Failed {
        error: String,
    },
}

impl MatchingStatus {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Starting | Self::Matching { .. })
    }
}

/// Kind of background task the orchestrator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollKind {
    /// Job status polling during download and extraction.
    JobStatus,
    /// Job status polling while catalog matching runs.
    CatalogMatch,
    /// One-shot results fetch.
    ResultsRefresh,
}

impl PollKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobStatus => "job_status",
            Self::CatalogMatch => "catalog_match",
            Self::ResultsRefresh => "results_refresh",
        }
    }
}

/// Identity of a background task. Results carrying a token that is no longer
/// live are discarded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PollToken {
    pub kind: PollKind,
    pub step: Step,
    pub job_id: String,
}

impl PollToken {
    pub fn new(kind: PollKind, step: Step, job_id: impl Into<String>) -> Self {
        Self {
            kind,
            step,
            job_id: job_id.into(),
        }
    }
}

/// Everything the orchestrator knows about the current analysis session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub step: Step,
    /// Last job record seen from the backend.
    pub job: Option<Job>,
    pub selected_fields: BTreeSet<String>,
    pub error: Option<StepError>,
    pub results: Vec<ExtractedMetadata>,
    pub matching: MatchingStatus,
}

impl SessionState {
    pub fn job_id(&self) -> Option<&str> {
        self.job.as_ref().map(|j| j.job_id.as_str())
    }

    fn job_status(&self) -> Option<JobStatus> {
        self.job.as_ref().map(|j| j.status)
    }

    /// Download finished; waiting for the user to continue.
    pub fn download_ready(&self) -> bool {
        self.step == Step::Download && self.job_status() == Some(JobStatus::Completed)
    }

    pub fn can_extract(&self) -> bool {
        self.step == Step::Metadata
            && self.job.is_some()
            && super::machine::validate_selection(&self.selected_fields).is_ok()
    }

    pub fn can_retry_matching(&self) -> bool {
        self.step == Step::Results
            && self.reading_materials_selected()
            && matches!(self.matching, MatchingStatus::Failed { .. })
    }

    pub fn reading_materials_selected(&self) -> bool {
        self.selected_fields.contains(READING_MATERIALS_FIELD)
    }

    /// True once any document carries catalog-matching output.
    pub fn has_library_matches(&self) -> bool {
        self.results.iter().any(|r| r.library_matches.is_some())
    }

    /// The token a task of `kind` must carry to be allowed to touch this state.
    pub fn live_token(&self, kind: PollKind) -> Option<PollToken> {
        let job = self.job.as_ref()?;
        let live = match kind {
            PollKind::JobStatus => {
                matches!(self.step, Step::Download | Step::Extract)
                    && self.error.is_none()
                    && job.status.is_active()
            }
            PollKind::CatalogMatch => {
                self.step == Step::Results
                    && matches!(self.matching, MatchingStatus::Matching { .. })
            }
            PollKind::ResultsRefresh => match self.step {
                Step::Extract => self.error.is_none() && job.status == JobStatus::Completed,
                Step::Results => true,
                _ => false,
            },
        };
        live.then(|| PollToken::new(kind, self.step, job.job_id.clone()))
    }

    pub fn is_live(&self, token: &PollToken) -> bool {
        self.live_token(token.kind).as_ref() == Some(token)
    }
}

/// Session state plus the affordances derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub state: SessionState,
    pub download_ready: bool,
    pub can_extract: bool,
    pub can_retry_matching: bool,
    /// Reading materials across all results, and how many of them are required.
    pub reading_materials: usize,
    pub required_readings: usize,
    /// Background tasks currently running.
    pub polling: Vec<PollKind>,
}

/// Errors returned by orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Please enter a URL")]
    EmptyUrl,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Please select at least one metadata field")]
    NoFieldsSelected,

    #[error("The '{0}' field is required for library matching")]
    RequiredFieldMissing(String),

    #[error("Select at least one field in addition to '{0}'")]
    OnlyRequiredField(String),

    #[error("invalid step: expected {expected}, got {actual}")]
    InvalidStep { expected: Step, actual: Step },

    #[error("no job is active in this session")]
    NoActiveJob,

    #[error("A submission is already in progress")]
    SubmitInProgress,

    #[error("The download has not finished yet")]
    DownloadNotReady,

    #[error("Library matching requires the '{0}' field")]
    MatchingUnavailable(String),

    #[error("Extraction request timed out after {} seconds. The server may still be busy; please try again.", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Service(#[from] JobServiceError),
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyUrl
            | Self::InvalidUrl(_)
            | Self::NoFieldsSelected
            | Self::RequiredFieldMissing(_)
            | Self::OnlyRequiredField(_) => ErrorKind::Validation,
            Self::InvalidStep { .. }
            | Self::NoActiveJob
            | Self::SubmitInProgress
            | Self::DownloadNotReady
            | Self::MatchingUnavailable(_) => ErrorKind::InvalidStep,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Service(e) => StepError::from_service(e).kind,
        }
    }

    /// Error for a failed extraction start. A client-side timeout reports the
    /// same way as the start call's own deadline.
    pub(crate) fn extraction_start(err: JobServiceError, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Service(err)
        }
    }

    pub fn to_step_error(&self) -> StepError {
        match self {
            Self::Service(e) => StepError::from_service(e),
            other => StepError::new(other.kind(), other.to_string()),
        }
    }
}
