//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the session orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// How often to poll job status while downloading or extracting (milliseconds).
    #[serde(default = "default_job_poll_interval")]
    pub job_poll_interval_ms: u64,

    /// How often to poll job status while catalog matching runs (milliseconds).
    #[serde(default = "default_match_poll_interval")]
    pub match_poll_interval_ms: u64,

    /// Upper bound on the extraction start request (milliseconds).
    /// Expiry is reported as a timeout, distinct from server errors.
    #[serde(default = "default_extraction_timeout")]
    pub extraction_start_timeout_ms: u64,
}

fn default_job_poll_interval() -> u64 {
    2000 // 2 seconds
}

fn default_match_poll_interval() -> u64 {
    3000 // 3 seconds
}

fn default_extraction_timeout() -> u64 {
    120_000 // 2 minutes
}

impl OrchestratorConfig {
    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }

    pub fn match_poll_interval(&self) -> Duration {
        Duration::from_millis(self.match_poll_interval_ms)
    }

    pub fn extraction_start_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_start_timeout_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            job_poll_interval_ms: default_job_poll_interval(),
            match_poll_interval_ms: default_match_poll_interval(),
            extraction_start_timeout_ms: default_extraction_timeout(),
        }
    }
}
