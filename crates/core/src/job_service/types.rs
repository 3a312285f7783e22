//! Wire types exchanged with the analysis backend.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Identifier of the metadata field that catalog matching depends on.
pub const READING_MATERIALS_FIELD: &str = "reading_materials";

// ============================================================================
// Jobs
// ============================================================================

/// Lifecycle status reported by the backend for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Downloading,
    Processing,
    Completed,
    Error,
    Failed,
}

impl JobStatus {
    /// The backend is still working on the job.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Downloading | Self::Processing)
    }

    /// The job reported a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Failed => "failed",
        }
    }
}

/// Explicit work phase, when the backend reports one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Discovery,
    Download,
    Extraction,
    CatalogMatching,
    #[serde(other)]
    Other,
}

/// Full job record returned by the job-status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    /// Progress percentage (0-100).
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_found: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_downloaded: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_processed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_fields: Option<Vec<String>>,
    /// Server-side path of the extracted metadata file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_file: Option<String>,
    /// Server-side path of the results file enriched with library matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primo_results_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<JobPhase>,
}

impl Job {
    /// A freshly created job as acknowledged by the create call.
    pub fn pending(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Pending,
            progress: 0,
            message: String::new(),
            files_found: None,
            files_downloaded: None,
            files_processed: None,
            selected_fields: None,
            results_file: None,
            primo_results_file: None,
            phase: None,
        }
    }

    /// Progress clamped to 0-100.
    pub fn progress_pct(&self) -> u32 {
        self.progress.min(100)
    }
}

/// Entry of the job listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub job_id: String,
    pub selected_fields: Vec<String>,
}

/// Acknowledgement of an asynchronous backend operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

// ============================================================================
// Metadata
// ============================================================================

/// A metadata field the backend can extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

/// A reading material entry extracted from a syllabus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingMaterial {
    pub title: String,
    #[serde(default, alias = "author", skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(
        rename = "type",
        default,
        alias = "media_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub material_type: Option<String>,
    /// "required", "optional", "equipment", ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ReadingMaterial {
    pub fn is_required(&self) -> bool {
        self.requirement
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("required"))
    }
}

/// Value extracted for one metadata field.
///
/// Variant order matters: serde tries them top to bottom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
    Materials(Vec<ReadingMaterial>),
    List(Vec<serde_json::Value>),
    Other(serde_json::Value),
}

/// Extraction result for one syllabus document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub filename: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, FieldValue>,
    /// Present once catalog matching has processed this document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_matches: Option<Vec<LibraryMatch>>,
}

impl ExtractedMetadata {
    /// Reading materials of this document, if any were extracted as structured entries
    /// or plain titles.
    pub fn reading_materials(&self) -> Vec<ReadingMaterial> {
        match self.metadata.get(READING_MATERIALS_FIELD) {
            Some(FieldValue::Materials(items)) => items.clone(),
            Some(FieldValue::List(items)) => items
                .iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(title) => Some(ReadingMaterial {
                        title: title.clone(),
                        creator: None,
                        material_type: None,
                        requirement: None,
                        url: None,
                    }),
                    other => serde_json::from_value(other.clone()).ok(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// Library catalog matches
// ============================================================================

/// Catalog matches for one reading-material query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryMatch {
    pub original_query: String,
    #[serde(default)]
    pub match_score: f64,
    #[serde(default)]
    pub matches: Vec<LibraryResource>,
}

/// Availability of a catalog resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable,
    CheckedOut,
    #[serde(other)]
    Unknown,
}

/// A resource record found in the library catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryResource {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub availability: Availability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

// ============================================================================
// Response envelopes
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct FieldsEnvelope {
    pub fields: Vec<MetadataField>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobsEnvelope {
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultsEnvelope {
    pub results: Vec<ExtractedMetadata>,
}
