//! Mock job service for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::job_service::{
    Acknowledgement, CreateJobRequest, CreateJobResponse, ExtractedMetadata, ExtractionRequest,
    Job, JobService, JobServiceError, JobSummary, MetadataField,
};

use super::fixtures;

/// Backend operation, used to target failures and delays and to count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    CreateJob,
    JobStatus,
    MetadataFields,
    ListJobs,
    StartExtraction,
    Results,
    StartCatalogMatch,
}

/// Failure injected into an operation.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// The backend answers with a non-2xx status and this body.
    Upstream { status: u16, body: String },
    /// The request never reaches the backend.
    Transport,
}

impl MockFailure {
    fn to_error(&self) -> JobServiceError {
        match self {
            Self::Upstream { status, body } => JobServiceError::upstream(*status, body.clone()),
            Self::Transport => transport_error(),
        }
    }
}

/// A `reqwest` error without any network access: building a request for an
/// unparsable URL fails synchronously.
fn transport_error() -> JobServiceError {
    match reqwest::Client::new().get("http://[::1").build() {
        Err(e) => JobServiceError::HttpError(e),
        Ok(_) => JobServiceError::ParseError("transport failure".to_string()),
    }
}

/// A recorded backend call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub operation: MockOperation,
    /// Job the call targeted, if any.
    pub job_id: Option<String>,
    /// Request body, if any.
    pub payload: Option<serde_json::Value>,
}

/// Mock implementation of the JobService trait.
///
/// Provides controllable behavior for testing:
/// - Scripted job status sequences per job
/// - Configurable results, field catalog and job listing
/// - Sticky failures and artificial delays per operation
/// - Recorded calls for assertions
///
/// # Example
///
/// ```rust,ignore
/// use syllabus_core::testing::{fixtures, MockJobService, MockOperation};
///
/// let service = MockJobService::new();
/// service.set_next_job_id("J1").await;
/// service.script_statuses("J1", vec![
///     fixtures::job("J1", JobStatus::Downloading, 40, "Downloading 4/10"),
///     fixtures::completed_download("J1", 10),
/// ]).await;
///
/// // ... drive the orchestrator ...
/// assert_eq!(service.call_count(MockOperation::CreateJob).await, 1);
/// ```
pub struct MockJobService {
    /// Scripted job records; the last entry repeats once the script runs out.
    statuses: Arc<RwLock<HashMap<String, VecDeque<Job>>>>,
    /// Job ids handed out by create_job, in order.
    job_ids: Arc<RwLock<VecDeque<String>>>,
    job_counter: AtomicU32,
    fields: Arc<RwLock<Vec<MetadataField>>>,
    jobs: Arc<RwLock<Vec<JobSummary>>>,
    results: Arc<RwLock<HashMap<String, Vec<ExtractedMetadata>>>>,
    failures: Arc<RwLock<HashMap<MockOperation, MockFailure>>>,
    delays: Arc<RwLock<HashMap<MockOperation, Duration>>>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
}

impl std::fmt::Debug for MockJobService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockJobService")
            .field("statuses", &"<statuses>")
            .field("results", &"<results>")
            .field("calls", &"<calls>")
            .finish()
    }
}

impl Default for MockJobService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockJobService {
    /// Create a mock with the standard field catalog and no jobs.
    pub fn new() -> Self {
        Self {
            statuses: Arc::new(RwLock::new(HashMap::new())),
            job_ids: Arc::new(RwLock::new(VecDeque::new())),
            job_counter: AtomicU32::new(0),
            fields: Arc::new(RwLock::new(fixtures::metadata_fields())),
            jobs: Arc::new(RwLock::new(Vec::new())),
            results: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            delays: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Id returned by the next create_job call.
    pub async fn set_next_job_id(&self, job_id: impl Into<String>) {
        self.job_ids.write().await.push_back(job_id.into());
    }

    /// Script the records returned by successive job_status calls.
    pub async fn script_statuses(&self, job_id: &str, records: Vec<Job>) {
        self.statuses
            .write()
            .await
            .insert(job_id.to_string(), records.into_iter().collect());
    }

    /// Append records to a job's script.
    pub async fn push_statuses(&self, job_id: &str, records: Vec<Job>) {
        let mut statuses = self.statuses.write().await;
        let queue = statuses.entry(job_id.to_string()).or_default();
        // Drop the sticky tail so the new records are reached.
        if queue.len() == 1 {
            queue.clear();
        }
        queue.extend(records);
    }

    pub async fn set_results(&self, job_id: &str, results: Vec<ExtractedMetadata>) {
        self.results
            .write()
            .await
            .insert(job_id.to_string(), results);
    }

    pub async fn set_fields(&self, fields: Vec<MetadataField>) {
        *self.fields.write().await = fields;
    }

    pub async fn set_jobs(&self, jobs: Vec<JobSummary>) {
        *self.jobs.write().await = jobs;
    }

    /// Make every call of `operation` fail until cleared.
    pub async fn fail(&self, operation: MockOperation, failure: MockFailure) {
        self.failures.write().await.insert(operation, failure);
    }

    pub async fn clear_failure(&self, operation: MockOperation) {
        self.failures.write().await.remove(&operation);
    }

    /// Delay every call of `operation`.
    pub async fn set_delay(&self, operation: MockOperation, delay: Duration) {
        self.delays.write().await.insert(operation, delay);
    }

    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self, operation: MockOperation) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub async fn clear_recorded(&self) {
        self.calls.write().await.clear();
    }

    /// Record the call, apply any delay, then return the injected failure if set.
    async fn enter(
        &self,
        operation: MockOperation,
        job_id: Option<&str>,
        payload: Option<serde_json::Value>,
    ) -> Result<(), JobServiceError> {
        self.calls.write().await.push(RecordedCall {
            operation,
            job_id: job_id.map(str::to_string),
            payload,
        });

        let delay = self.delays.read().await.get(&operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.failures.read().await.get(&operation) {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

fn not_found(what: &str) -> JobServiceError {
    JobServiceError::upstream(404, format!(r#"{{"detail":"{} not found"}}"#, what))
}

#[async_trait]
impl JobService for MockJobService {
    async fn create_job(
        &self,
        request: &CreateJobRequest,
    ) -> Result<CreateJobResponse, JobServiceError> {
        self.enter(
            MockOperation::CreateJob,
            None,
            serde_json::to_value(request).ok(),
        )
        .await?;

        let job_id = match self.job_ids.write().await.pop_front() {
            Some(id) => id,
            None => format!(
                "job-{}",
                self.job_counter.fetch_add(1, Ordering::SeqCst) + 1
            ),
        };

        self.statuses
            .write()
            .await
            .entry(job_id.clone())
            .or_insert_with(|| VecDeque::from([Job::pending(job_id.clone())]));

        Ok(CreateJobResponse {
            job_id,
            status: "started".to_string(),
        })
    }

    async fn job_status(&self, job_id: &str) -> Result<Job, JobServiceError> {
        self.enter(MockOperation::JobStatus, Some(job_id), None)
            .await?;

        let mut statuses = self.statuses.write().await;
        let queue = statuses.get_mut(job_id).ok_or_else(|| not_found("Job"))?;
        let record = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        record.ok_or_else(|| not_found("Job"))
    }

    async fn metadata_fields(&self) -> Result<Vec<MetadataField>, JobServiceError> {
        self.enter(MockOperation::MetadataFields, None, None).await?;
        Ok(self.fields.read().await.clone())
    }

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, JobServiceError> {
        self.enter(MockOperation::ListJobs, None, None).await?;
        Ok(self.jobs.read().await.clone())
    }

    async fn start_extraction(
        &self,
        request: &ExtractionRequest,
    ) -> Result<Acknowledgement, JobServiceError> {
        self.enter(
            MockOperation::StartExtraction,
            Some(&request.job_id),
            serde_json::to_value(request).ok(),
        )
        .await?;

        if !self.statuses.read().await.contains_key(&request.job_id) {
            return Err(not_found("Job"));
        }
        Ok(Acknowledgement {
            status: "started".to_string(),
            message: "Metadata extraction started".to_string(),
        })
    }

    async fn results(&self, job_id: &str) -> Result<Vec<ExtractedMetadata>, JobServiceError> {
        self.enter(MockOperation::Results, Some(job_id), None).await?;
        self.results
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| not_found("Results"))
    }

    async fn start_catalog_match(&self, job_id: &str) -> Result<Acknowledgement, JobServiceError> {
        self.enter(MockOperation::StartCatalogMatch, Some(job_id), None)
            .await?;

        if !self.results.read().await.contains_key(job_id) {
            return Err(not_found("Metadata results"));
        }
        Ok(Acknowledgement {
            status: "started".to_string(),
            message: "Primo checking started".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_service::JobStatus;

    #[tokio::test]
    async fn test_status_script_repeats_last_record() {
        let service = MockJobService::new();
        service
            .script_statuses(
                "J1",
                vec![
                    fixtures::job("J1", JobStatus::Downloading, 50, "Downloading"),
                    fixtures::completed_download("J1", 3),
                ],
            )
            .await;

        assert_eq!(
            service.job_status("J1").await.unwrap().status,
            JobStatus::Downloading
        );
        for _ in 0..3 {
            assert_eq!(
                service.job_status("J1").await.unwrap().status,
                JobStatus::Completed
            );
        }
        assert_eq!(service.call_count(MockOperation::JobStatus).await, 4);
    }

    #[tokio::test]
    async fn test_create_job_assigns_ids() {
        let service = MockJobService::new();
        service.set_next_job_id("J7").await;
        let request = CreateJobRequest {
            url: "https://example.edu/syllabi".to_string(),
            job_name: None,
        };

        assert_eq!(service.create_job(&request).await.unwrap().job_id, "J7");
        assert_eq!(service.create_job(&request).await.unwrap().job_id, "job-1");
        assert_eq!(
            service.job_status("J7").await.unwrap().status,
            JobStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let service = MockJobService::new();
        service
            .fail(
                MockOperation::ListJobs,
                MockFailure::Upstream {
                    status: 503,
                    body: "unavailable".to_string(),
                },
            )
            .await;
        service
            .fail(MockOperation::MetadataFields, MockFailure::Transport)
            .await;

        let err = service.list_jobs().await.unwrap_err();
        assert_eq!(err.to_string(), "Server error (503): unavailable");
        assert!(service.metadata_fields().await.unwrap_err().is_transport());

        service.clear_failure(MockOperation::ListJobs).await;
        assert!(service.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let service = MockJobService::new();
        let err = service.job_status("missing").await.unwrap_err();
        assert_eq!(err.to_string(), "Job not found");
    }
}
