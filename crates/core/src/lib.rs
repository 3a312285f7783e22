pub mod config;
pub mod job_service;
pub mod metrics;
pub mod orchestrator;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, BackendConfig, Config, ConfigError,
    ServerConfig,
};
pub use job_service::{
    Acknowledgement, Availability, ExtractedMetadata, FieldValue, HttpJobService, Job,
    JobPhase, JobService, JobServiceError, JobStatus, JobSummary, LibraryMatch,
    LibraryResource, MetadataField, ReadingMaterial, READING_MATERIALS_FIELD,
};
pub use orchestrator::{
    ErrorKind, MatchingStatus, OrchestratorConfig, OrchestratorError, PollKind, PollToken,
    SessionOrchestrator, SessionState, SessionView, Step, StepError,
};
