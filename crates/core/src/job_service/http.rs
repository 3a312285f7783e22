//! HTTP client for the analysis backend.

use std::time::{Duration, Instant};

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{
    Acknowledgement, CreateJobRequest, CreateJobResponse, ExtractedMetadata, ExtractionRequest,
    FieldsEnvelope, Job, JobSummary, JobsEnvelope, MetadataField, ResultsEnvelope,
};
use super::{JobService, JobServiceError};
use crate::config::BackendConfig;
use crate::metrics::{BACKEND_REQUEST_DURATION, BACKEND_REQUESTS};

/// Job service backed by the analysis backend's REST API.
pub struct HttpJobService {
    client: Client,
    base_url: String,
    /// Extraction start blocks until the backend accepted the work, which
    /// can outlast the per-request timeout.
    extraction_timeout: Duration,
}

impl HttpJobService {
    /// Create a new client for the configured backend.
    pub fn new(config: &BackendConfig) -> Result<Self, JobServiceError> {
        let timeout = Duration::from_secs(config.request_timeout_secs as u64);
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            extraction_timeout: timeout,
        })
    }

    /// Allow the extraction start call to run for up to `timeout`.
    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = self.extraction_timeout.max(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn job_path(prefix: &str, job_id: &str) -> String {
        format!("{}/{}", prefix, urlencoding::encode(job_id))
    }

    /// Send a request and decode its JSON body, recording metrics per operation.
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, JobServiceError> {
        let start = Instant::now();
        let result = async {
            let response = request.send().await?;
            Self::decode(response).await
        }
        .await;

        BACKEND_REQUEST_DURATION
            .with_label_values(&[operation])
            .observe(start.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) if e.is_transport() => "transport_error",
            Err(_) => "error",
        };
        BACKEND_REQUESTS
            .with_label_values(&[operation, outcome])
            .inc();

        result
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, JobServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobServiceError::upstream(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| JobServiceError::ParseError(e.to_string()))
    }
}

#[async_trait::async_trait]
impl JobService for HttpJobService {
    async fn create_job(
        &self,
        request: &CreateJobRequest,
    ) -> Result<CreateJobResponse, JobServiceError> {
        debug!("Creating job for url='{}'", request.url);
        let builder = self
            .client
            .post(self.url("/api/discover-syllabi"))
            .json(request);
        self.execute("create_job", builder).await
    }

    async fn job_status(&self, job_id: &str) -> Result<Job, JobServiceError> {
        debug!("Fetching status of job {}", job_id);
        let builder = self
            .client
            .get(self.url(&Self::job_path("/api/job-status", job_id)));
        self.execute("job_status", builder).await
    }

    async fn metadata_fields(&self) -> Result<Vec<MetadataField>, JobServiceError> {
        let builder = self.client.get(self.url("/api/metadata-fields"));
        let envelope: FieldsEnvelope = self.execute("metadata_fields", builder).await?;
        Ok(envelope.fields)
    }

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, JobServiceError> {
        let builder = self.client.get(self.url("/api/jobs"));
        let envelope: JobsEnvelope = self.execute("list_jobs", builder).await?;
        Ok(envelope.jobs)
    }

    async fn start_extraction(
        &self,
        request: &ExtractionRequest,
    ) -> Result<Acknowledgement, JobServiceError> {
        debug!(
            "Starting extraction for job {} with fields {:?}",
            request.job_id, request.selected_fields
        );
        let builder = self
            .client
            .post(self.url("/api/extract-metadata"))
            .timeout(self.extraction_timeout)
            .json(request);
        self.execute("start_extraction", builder).await
    }

    async fn results(&self, job_id: &str) -> Result<Vec<ExtractedMetadata>, JobServiceError> {
        debug!("Fetching results of job {}", job_id);
        let builder = self
            .client
            .get(self.url(&Self::job_path("/api/results", job_id)));
        let envelope: ResultsEnvelope = self.execute("results", builder).await?;
        Ok(envelope.results)
    }

    async fn start_catalog_match(&self, job_id: &str) -> Result<Acknowledgement, JobServiceError> {
        debug!("Starting catalog matching for job {}", job_id);
        let builder = self
            .client
            .post(self.url(&Self::job_path("/api/check-primo", job_id)));
        self.execute("start_catalog_match", builder).await
    }
}
