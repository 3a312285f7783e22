//! Session state machine.
//!
//! All session mutations go through [`reduce`], a pure function of the current
//! state and an event. It returns the next state plus the effects the runner
//! must perform (start a poll loop, fetch results, start catalog matching).
//! Events produced by background tasks carry a [`PollToken`]; they are dropped
//! unless the token is still live for the state they would modify.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::job_service::{
    ExtractedMetadata, Job, JobPhase, JobStatus, LibraryMatch, READING_MATERIALS_FIELD,
};

use super::types::{
    MatchingStatus, OrchestratorError, PollKind, PollToken, SessionState, Step,
    StepError,
};

/// Something that happened to the session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The backend accepted a source URL and created a job.
    JobCreated(Job),
    SubmitFailed(StepError),
    /// A poll returned the job's current record.
    JobPolled { token: PollToken, job: Job },
    /// A poll could not reach the backend or got an error back.
    PollFailed { token: PollToken, error: StepError },
    DownloadConfirmed,
    FieldsSelected(BTreeSet<String>),
    FieldToggled(String),
    /// The backend accepted the extraction start call for `job_id`.
    ExtractionStarted { job_id: String },
    ExtractionFailed { job_id: String, error: StepError },
    ResultsLoaded {
        token: PollToken,
        results: Vec<ExtractedMetadata>,
    },
    ResultsFailed { token: PollToken, error: StepError },
    /// The backend acknowledged the catalog-matching start call.
    MatchingAccepted { job_id: String },
    MatchingRejected { job_id: String, error: StepError },
    MatchingRetried,
    Reset,
}

/// Work the runner performs after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start a periodic job-status poll bound to the token.
    StartPolling(PollToken),
    /// Fetch results once.
    FetchResults(PollToken),
    /// Call the catalog-matching start endpoint.
    StartCatalogMatch { job_id: String },
}

static CATALOG_ACTIVITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)checking resources|library|primo|catalog").expect("valid regex")
});

/// Whether a job record shows catalog-matching work rather than some other phase.
///
/// An explicit `phase` wins. Without one, the backend's progress message is
/// the only signal available.
pub fn indicates_catalog_activity(job: &Job) -> bool {
    match job.phase {
        Some(phase) => phase == JobPhase::CatalogMatching,
        None => CATALOG_ACTIVITY.is_match(&job.message),
    }
}

/// Validate a source URL before any network call.
pub fn validate_source_url(url: &str) -> Result<String, OrchestratorError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(OrchestratorError::EmptyUrl);
    }

    match reqwest::Url::parse(trimmed) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(trimmed.to_string()),
        Ok(parsed) => Err(OrchestratorError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        ))),
        Err(e) => Err(OrchestratorError::InvalidUrl(e.to_string())),
    }
}

/// Validate a field selection for extraction.
///
/// The selection must contain `reading_materials` and at least one other field.
pub fn validate_selection(selected: &BTreeSet<String>) -> Result<(), OrchestratorError> {
    if selected.is_empty() {
        return Err(OrchestratorError::NoFieldsSelected);
    }
    if !selected.contains(READING_MATERIALS_FIELD) {
        return Err(OrchestratorError::RequiredFieldMissing(
            READING_MATERIALS_FIELD.to_string(),
        ));
    }
    if selected.len() == 1 {
        return Err(OrchestratorError::OnlyRequiredField(
            READING_MATERIALS_FIELD.to_string(),
        ));
    }
    Ok(())
}

/// Merge freshly fetched results into the ones already held.
///
/// Documents are matched by filename. Library matches only accumulate: a
/// fetch without matches never drops matches already seen, and matches for
/// the same query replace the previous entry instead of duplicating it.
pub fn merge_results(existing: &mut Vec<ExtractedMetadata>, incoming: Vec<ExtractedMetadata>) {
    for doc in incoming {
        match existing.iter_mut().find(|d| d.filename == doc.filename) {
            Some(current) => {
                if !doc.metadata.is_empty() {
                    current.metadata = doc.metadata;
                }
                if let Some(matches) = doc.library_matches {
                    let merged = current.library_matches.get_or_insert_with(Vec::new);
                    merge_matches(merged, matches);
                }
            }
            None => existing.push(doc),
        }
    }
}

fn merge_matches(existing: &mut Vec<LibraryMatch>, incoming: Vec<LibraryMatch>) {
    for m in incoming {
        match existing
            .iter_mut()
            .find(|e| e.original_query == m.original_query)
        {
            Some(current) => *current = m,
            None => existing.push(m),
        }
    }
}

/// Apply an event to the session.
pub fn reduce(state: SessionState, event: SessionEvent) -> (SessionState, Vec<Effect>) {
    let mut state = state;
    let mut effects = Vec::new();

    match event {
        SessionEvent::JobCreated(job) => {
            if state.step == Step::Upload {
                let token = PollToken::new(PollKind::JobStatus, Step::Download, &job.job_id);
                state = SessionState {
                    step: Step::Download,
                    job: Some(job),
                    ..Default::default()
                };
                effects.push(Effect::StartPolling(token));
            }
        }

        SessionEvent::SubmitFailed(error) => {
            if state.step == Step::Upload {
                state.error = Some(error);
            }
        }

        SessionEvent::JobPolled { token, job } => {
            if state.is_live(&token) && job.job_id == token.job_id {
                match token.kind {
                    PollKind::JobStatus => on_job_polled(&mut state, job, &mut effects),
                    PollKind::CatalogMatch => on_match_polled(&mut state, job, &mut effects),
                    PollKind::ResultsRefresh => {}
                }
            }
        }

        SessionEvent::PollFailed { token, error } => {
            if state.is_live(&token) {
                match token.kind {
                    PollKind::JobStatus => state.error = Some(error),
                    PollKind::CatalogMatch => {
                        state.matching = MatchingStatus::Failed {
                            error: error.message,
                        }
                    }
                    PollKind::ResultsRefresh => {}
                }
            }
        }

        SessionEvent::DownloadConfirmed => {
            if state.download_ready() {
                state.step = Step::Metadata;
                state.error = None;
            }
        }

        SessionEvent::FieldsSelected(fields) => {
            if state.step == Step::Metadata {
                state.selected_fields = fields;
                state.error = None;
            }
        }

        SessionEvent::FieldToggled(id) => {
            if state.step == Step::Metadata {
                if !state.selected_fields.remove(&id) {
                    state.selected_fields.insert(id);
                }
                state.error = None;
            }
        }

        SessionEvent::ExtractionStarted { job_id } => {
            if state.step == Step::Metadata && state.job_id() == Some(job_id.as_str()) {
                if let Some(job) = state.job.as_mut() {
                    job.status = JobStatus::Processing;
                    job.progress = 0;
                    job.message = "Starting metadata extraction...".to_string();
                    job.selected_fields = Some(state.selected_fields.iter().cloned().collect());
                    let token = PollToken::new(PollKind::JobStatus, Step::Extract, &job.job_id);
                    state.step = Step::Extract;
                    state.error = None;
                    effects.push(Effect::StartPolling(token));
                }
            }
        }

        SessionEvent::ExtractionFailed { job_id, error } => {
            if state.step == Step::Metadata && state.job_id() == Some(job_id.as_str()) {
                state.error = Some(error);
            }
        }

        SessionEvent::ResultsLoaded { token, results } => {
            if state.is_live(&token) {
                match state.step {
                    Step::Extract => enter_results(&mut state, results, &mut effects),
                    Step::Results => {
                        merge_results(&mut state.results, results);
                        state.error = None;
                    }
                    _ => {}
                }
            }
        }

        SessionEvent::ResultsFailed { token, error } => {
            if state.is_live(&token) {
                match state.step {
                    Step::Extract => state.error = Some(error),
                    Step::Results => match state.matching {
                        MatchingStatus::Idle => state.error = Some(error),
                        _ => {
                            state.matching = MatchingStatus::Failed {
                                error: error.message,
                            }
                        }
                    },
                    _ => {}
                }
            }
        }

        SessionEvent::MatchingAccepted { job_id } => {
            if state.step == Step::Results
                && state.job_id() == Some(job_id.as_str())
                && state.matching == MatchingStatus::Starting
            {
                state.matching = MatchingStatus::Matching {
                    progress: 0,
                    message: "Library resource matching started".to_string(),
                    observed_activity: false,
                };
                effects.push(Effect::StartPolling(PollToken::new(
                    PollKind::CatalogMatch,
                    Step::Results,
                    job_id,
                )));
            }
        }

        SessionEvent::MatchingRejected { job_id, error } => {
            if state.step == Step::Results
                && state.job_id() == Some(job_id.as_str())
                && state.matching == MatchingStatus::Starting
            {
                state.matching = MatchingStatus::Failed {
                    error: error.message,
                };
            }
        }

        SessionEvent::MatchingRetried => {
            let retryable =
                !state.matching.is_in_flight() && state.matching != MatchingStatus::Matched;
            if state.step == Step::Results && state.reading_materials_selected() && retryable {
                if let Some(job_id) = state.job_id().map(str::to_string) {
                    state.matching = MatchingStatus::Starting;
                    effects.push(Effect::StartCatalogMatch { job_id });
                }
            }
        }

        SessionEvent::Reset => {
            state = SessionState::default();
        }
    }

    (state, effects)
}

fn on_job_polled(state: &mut SessionState, job: Job, effects: &mut Vec<Effect>) {
    if job.status.is_failure() {
        state.error = Some(StepError::job_failed(&job));
    } else if job.status == JobStatus::Completed && state.step == Step::Extract {
        effects.push(Effect::FetchResults(PollToken::new(
            PollKind::ResultsRefresh,
            Step::Extract,
            &job.job_id,
        )));
    }
    // Download completion deliberately waits for an explicit confirmation.
    state.job = Some(job);
}

fn on_match_polled(state: &mut SessionState, job: Job, effects: &mut Vec<Effect>) {
    let activity = indicates_catalog_activity(&job);
    let observed = match state.matching {
        MatchingStatus::Matching {
            observed_activity, ..
        } => observed_activity,
        _ => return,
    };

    match job.status {
        status if status.is_active() => {
            if activity {
                state.matching = MatchingStatus::Matching {
                    progress: job.progress_pct(),
                    message: job.message.clone(),
                    observed_activity: true,
                };
            }
        }
        JobStatus::Completed => {
            // A completion without any matching activity is the extraction
            // run's final status; the matching task has not started yet.
            if observed || activity {
                state.matching = MatchingStatus::Matched;
                effects.push(Effect::FetchResults(PollToken::new(
                    PollKind::ResultsRefresh,
                    Step::Results,
                    &job.job_id,
                )));
            }
        }
        _ => {
            state.matching = MatchingStatus::Failed {
                error: StepError::job_failed(&job).message,
            };
        }
    }

    state.job = Some(job);
}

fn enter_results(
    state: &mut SessionState,
    results: Vec<ExtractedMetadata>,
    effects: &mut Vec<Effect>,
) {
    state.step = Step::Results;
    state.error = None;
    merge_results(&mut state.results, results);

    state.matching = if state.has_library_matches() {
        MatchingStatus::Matched
    } else if state.reading_materials_selected() {
        match state.job_id() {
            Some(job_id) => {
                effects.push(Effect::StartCatalogMatch {
                    job_id: job_id.to_string(),
                });
                MatchingStatus::Starting
            }
            None => MatchingStatus::Idle,
        }
    } else {
        MatchingStatus::Idle
    };
}
