//! Testing utilities and mock implementations.
//!
//! Provides a mock of the analysis backend so the orchestrator and the server
//! can be exercised end to end without a real backend.
//!
//! # Example
//!
//! ```rust,ignore
//! use syllabus_core::testing::{fixtures, MockJobService};
//!
//! let service = Arc::new(MockJobService::new());
//! service.set_results("J1", vec![fixtures::syllabus("BIO101.pdf", &["Plant Biology"])]).await;
//!
//! let orchestrator = SessionOrchestrator::new(config, service.clone());
//! ```

mod mock_job_service;

pub use mock_job_service::{MockFailure, MockJobService, MockOperation, RecordedCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::BTreeMap;

    use crate::job_service::{
        Availability, ExtractedMetadata, FieldValue, Job, JobStatus, LibraryMatch,
        LibraryResource, MetadataField, ReadingMaterial, READING_MATERIALS_FIELD,
    };

    /// The field catalog the analysis backend ships with.
    pub fn metadata_fields() -> Vec<MetadataField> {
        [
            ("year", "Year", "Academic year"),
            ("semester", "Semester", "Academic semester"),
            ("class_name", "Class Name", "Course title"),
            ("class_number", "Class Number", "Course code"),
            ("instructor", "Instructor", "Course instructor"),
            ("university", "University", "Institution name"),
            ("main_topic", "Main Topic", "Course subject/topic"),
            (
                READING_MATERIALS_FIELD,
                "Reading Materials",
                "Required and suggested readings",
            ),
        ]
        .into_iter()
        .map(|(id, label, description)| MetadataField {
            id: id.to_string(),
            label: label.to_string(),
            description: description.to_string(),
        })
        .collect()
    }

    /// Create a job record.
    pub fn job(job_id: &str, status: JobStatus, progress: u32, message: &str) -> Job {
        let mut job = Job::pending(job_id);
        job.status = status;
        job.progress = progress;
        job.message = message.to_string();
        job
    }

    /// A job whose download finished with `files` PDFs.
    pub fn completed_download(job_id: &str, files: u32) -> Job {
        let mut job = job(
            job_id,
            JobStatus::Completed,
            100,
            &format!("Download complete! Found {} PDFs", files),
        );
        job.files_found = Some(files);
        job.files_downloaded = Some(files);
        job
    }

    /// A job whose extraction finished.
    pub fn completed_extraction(job_id: &str, files: u32) -> Job {
        let mut job = job(
            job_id,
            JobStatus::Completed,
            100,
            &format!("Metadata extraction complete! Processed {} files", files),
        );
        job.files_processed = Some(files);
        job
    }

    /// A job in the middle of catalog matching.
    pub fn checking_resources(job_id: &str, file: &str, index: u32, total: u32) -> Job {
        job(
            job_id,
            JobStatus::Processing,
            index * 100 / total.max(1),
            &format!("Checking resources for {} ({}/{})", file, index, total),
        )
    }

    /// A job whose catalog matching finished.
    pub fn completed_matching(job_id: &str, matched: u32, total: u32) -> Job {
        job(
            job_id,
            JobStatus::Completed,
            100,
            &format!(
                "Library matching complete! Found matches for {}/{} syllabi",
                matched, total
            ),
        )
    }

    /// Extraction output for one syllabus with the given reading titles.
    pub fn syllabus(filename: &str, readings: &[&str]) -> ExtractedMetadata {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "class_name".to_string(),
            FieldValue::Text("Introduction to Botany".to_string()),
        );
        metadata.insert(
            READING_MATERIALS_FIELD.to_string(),
            FieldValue::Materials(
                readings
                    .iter()
                    .map(|title| ReadingMaterial {
                        title: title.to_string(),
                        creator: Some("J. Smith".to_string()),
                        material_type: Some("book".to_string()),
                        requirement: Some("required".to_string()),
                        url: None,
                    })
                    .collect(),
            ),
        );
        ExtractedMetadata {
            filename: filename.to_string(),
            metadata,
            library_matches: None,
        }
    }

    /// A catalog match with one available resource.
    pub fn library_match(query: &str) -> LibraryMatch {
        LibraryMatch {
            original_query: query.to_string(),
            match_score: 0.92,
            matches: vec![LibraryResource {
                title: query.to_string(),
                authors: vec!["J. Smith".to_string()],
                availability: Availability::Available,
                format: Some("Book".to_string()),
                location: Some("Main Library".to_string()),
                call_number: Some("QK47 .S65".to_string()),
                link: Some("https://library.example.edu/record/1".to_string()),
                cover_image: None,
                due_date: None,
            }],
        }
    }

    /// `syllabus` with a catalog match for every reading.
    pub fn matched_syllabus(filename: &str, readings: &[&str]) -> ExtractedMetadata {
        let mut doc = syllabus(filename, readings);
        doc.library_matches = Some(readings.iter().map(|r| library_match(r)).collect());
        doc
    }
}
