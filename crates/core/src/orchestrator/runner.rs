//! Session orchestrator implementation.
//!
//! Owns the session state and the background tasks that drive it:
//! - Job status polling during download and extraction
//! - Catalog-match polling while library matching runs
//! - One-shot results fetches
//!
//! Every state change goes through [`reduce`]; this module only performs the
//! effects it asks for and keeps the set of running tasks in line with the
//! tokens the current state considers live.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockWriteGuard};

use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::job_service::{
    CreateJobRequest, ExtractionRequest, Job, JobService, JobSummary, MetadataField,
};
use crate::metrics::{POLL_TICKS, SESSION_ERRORS, STEP_TRANSITIONS};

use super::config::OrchestratorConfig;
use super::machine::{
    reduce, validate_selection, validate_source_url, Effect, SessionEvent,
};
use super::types::{
    MatchingStatus, OrchestratorError, PollKind, PollToken, SessionState, SessionView, Step,
    StepError,
};

/// A running background task.
struct PollTask {
    id: u64,
    token: PollToken,
    cancel: CancellationToken,
}

struct TaskRegistry {
    /// Parent of every task of the current session; replaced on reset.
    session: CancellationToken,
    polls: HashMap<PollKind, PollTask>,
    /// Generation of the session whose submit call is awaiting the backend.
    submitting: Option<u64>,
}

struct Inner {
    config: OrchestratorConfig,
    service: Arc<dyn JobService>,
    state: RwLock<SessionState>,
    tasks: Mutex<TaskRegistry>,
    fields: OnceCell<Vec<MetadataField>>,
    shutdown: CancellationToken,
    next_task_id: AtomicU64,
    /// Bumped on every reset. Results of calls issued under an older
    /// generation are dropped.
    generation: AtomicU64,
}

/// Clears the in-flight submit marker when the submit call finishes.
struct SubmitGuard<'a> {
    orchestrator: &'a SessionOrchestrator,
    generation: u64,
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        let mut tasks = self.orchestrator.lock_tasks();
        if tasks.submitting == Some(self.generation) {
            tasks.submitting = None;
        }
    }
}

/// Drives one analysis session through upload, download, metadata selection,
/// extraction and results.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

impl SessionOrchestrator {
    /// Create a new orchestrator with an empty session.
    pub fn new(config: OrchestratorConfig, service: Arc<dyn JobService>) -> Self {
        let shutdown = CancellationToken::new();
        let tasks = TaskRegistry {
            session: shutdown.child_token(),
            polls: HashMap::new(),
            submitting: None,
        };

        Self {
            inner: Arc::new(Inner {
                config,
                service,
                state: RwLock::new(SessionState::default()),
                tasks: Mutex::new(tasks),
                fields: OnceCell::new(),
                shutdown,
                next_task_id: AtomicU64::new(1),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Snapshot of the session state.
    pub fn state(&self) -> SessionState {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the session state with derived affordances.
    pub fn view(&self) -> SessionView {
        let state = self.state();
        let readings: Vec<_> = state
            .results
            .iter()
            .flat_map(|r| r.reading_materials())
            .collect();
        SessionView {
            download_ready: state.download_ready(),
            can_extract: state.can_extract(),
            can_retry_matching: state.can_retry_matching(),
            reading_materials: readings.len(),
            required_readings: readings.iter().filter(|m| m.is_required()).count(),
            polling: self.active_polls(),
            state,
        }
    }

    /// Kinds of background tasks currently running.
    pub fn active_polls(&self) -> Vec<PollKind> {
        let tasks = self.lock_tasks();
        let mut kinds: Vec<PollKind> = tasks
            .polls
            .values()
            .filter(|t| !t.cancel.is_cancelled())
            .map(|t| t.token.kind)
            .collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Submit a source URL and start tracking the discovery/download job.
    pub async fn submit(
        &self,
        url: &str,
        job_name: Option<String>,
    ) -> Result<SessionView, OrchestratorError> {
        self.expect_step(Step::Upload)?;
        let generation = self.generation();

        let url = match validate_source_url(url) {
            Ok(url) => url,
            Err(e) => return Err(self.fail(generation, e, SessionEvent::SubmitFailed)),
        };

        let _guard = self.begin_submit(generation)?;

        let request = CreateJobRequest {
            url,
            job_name: job_name.filter(|n| !n.trim().is_empty()),
        };

        info!("Submitting source URL {}", request.url);
        match self.inner.service.create_job(&request).await {
            Ok(created) => {
                info!("Backend created job {}", created.job_id);
                let job = Job::pending(created.job_id);
                if !self.dispatch_in(generation, SessionEvent::JobCreated(job)) {
                    warn!("Session was reset while the job was being created");
                }
                Ok(self.view())
            }
            Err(e) => Err(self.fail(generation, e.into(), SessionEvent::SubmitFailed)),
        }
    }

    /// Continue from a completed download to field selection.
    pub fn confirm_download(&self) -> Result<SessionView, OrchestratorError> {
        let state = self.expect_step(Step::Download)?;
        if !state.download_ready() {
            return Err(OrchestratorError::DownloadNotReady);
        }
        self.dispatch(SessionEvent::DownloadConfirmed);
        Ok(self.view())
    }

    /// Replace the selected field set.
    pub fn select_fields(
        &self,
        fields: BTreeSet<String>,
    ) -> Result<SessionView, OrchestratorError> {
        self.expect_step(Step::Metadata)?;
        self.dispatch(SessionEvent::FieldsSelected(fields));
        Ok(self.view())
    }

    /// Add or remove one field from the selection.
    pub fn toggle_field(&self, field_id: &str) -> Result<SessionView, OrchestratorError> {
        self.expect_step(Step::Metadata)?;
        self.dispatch(SessionEvent::FieldToggled(field_id.to_string()));
        Ok(self.view())
    }

    /// Start metadata extraction for the selected fields.
    ///
    /// The start request is bounded by the configured timeout; on expiry the
    /// request is dropped and a timeout error is reported. On any failure the
    /// session stays in the metadata step so the user can retry.
    pub async fn start_extraction(&self) -> Result<SessionView, OrchestratorError> {
        let state = self.expect_step(Step::Metadata)?;
        let generation = self.generation();
        let job_id = state
            .job_id()
            .map(str::to_string)
            .ok_or(OrchestratorError::NoActiveJob)?;
        let failed = |error: StepError| SessionEvent::ExtractionFailed {
            job_id: job_id.clone(),
            error,
        };

        if let Err(e) = validate_selection(&state.selected_fields) {
            return Err(self.fail(generation, e, failed));
        }

        let request = ExtractionRequest {
            job_id: job_id.clone(),
            selected_fields: state.selected_fields.iter().cloned().collect(),
        };
        let timeout = self.inner.config.extraction_start_timeout();

        info!(
            "Starting extraction for job {} with fields {:?}",
            request.job_id, request.selected_fields
        );
        let outcome =
            tokio::time::timeout(timeout, self.inner.service.start_extraction(&request)).await;

        match outcome {
            Ok(Ok(ack)) => {
                debug!("Extraction accepted: {} {}", ack.status, ack.message);
                let event = SessionEvent::ExtractionStarted {
                    job_id: job_id.clone(),
                };
                if !self.dispatch_in(generation, event) {
                    warn!("Session was reset while extraction for job {} was starting", job_id);
                }
                Ok(self.view())
            }
            Ok(Err(e)) => Err(self.fail(
                generation,
                OrchestratorError::extraction_start(e, timeout),
                failed,
            )),
            Err(_) => Err(self.fail(generation, OrchestratorError::Timeout(timeout), failed)),
        }
    }

    /// Fetch results again and merge them into the session.
    pub async fn reload_results(&self) -> Result<SessionView, OrchestratorError> {
        let state = self.expect_step(Step::Results)?;
        let token = state
            .live_token(PollKind::ResultsRefresh)
            .ok_or(OrchestratorError::NoActiveJob)?;

        let generation = self.generation();
        let results = self.inner.service.results(&token.job_id).await?;
        self.dispatch_in(generation, SessionEvent::ResultsLoaded { token, results });
        Ok(self.view())
    }

    /// Start catalog matching again after a failure.
    ///
    /// Extracted results are left untouched. Calling this while matching is
    /// already running or finished changes nothing.
    pub fn retry_matching(&self) -> Result<SessionView, OrchestratorError> {
        let state = self.expect_step(Step::Results)?;
        if !state.reading_materials_selected() {
            return Err(OrchestratorError::MatchingUnavailable(
                crate::job_service::READING_MATERIALS_FIELD.to_string(),
            ));
        }
        if !state.matching.is_in_flight() && state.matching != MatchingStatus::Matched {
            info!("Retrying library matching");
            self.dispatch(SessionEvent::MatchingRetried);
        }
        Ok(self.view())
    }

    /// Cancel every background task and return to the initial state.
    pub fn reset(&self) -> SessionView {
        {
            let mut tasks = self.lock_tasks();
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            tasks.session.cancel();
            tasks.session = self.inner.shutdown.child_token();
            tasks.polls.clear();
            tasks.submitting = None;
        }
        self.dispatch(SessionEvent::Reset);
        info!("Session reset");
        self.view()
    }

    /// Cancel every background task. The orchestrator starts no new work afterwards.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.lock_tasks().polls.clear();
        info!("Session orchestrator stopped");
    }

    /// The metadata field catalog, fetched once.
    pub async fn metadata_fields(&self) -> Result<Vec<MetadataField>, OrchestratorError> {
        let fields = self
            .inner
            .fields
            .get_or_try_init(|| async { self.inner.service.metadata_fields().await })
            .await?;
        Ok(fields.clone())
    }

    /// Jobs known to the backend.
    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>, OrchestratorError> {
        Ok(self.inner.service.list_jobs().await?)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn expect_step(&self, expected: Step) -> Result<SessionState, OrchestratorError> {
        let state = self.state();
        if state.step != expected {
            return Err(OrchestratorError::InvalidStep {
                expected,
                actual: state.step,
            });
        }
        Ok(state)
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Mark a submit call as in flight for `generation`.
    fn begin_submit(&self, generation: u64) -> Result<SubmitGuard<'_>, OrchestratorError> {
        let mut tasks = self.lock_tasks();
        if tasks.submitting.is_some() {
            return Err(OrchestratorError::SubmitInProgress);
        }
        tasks.submitting = Some(generation);
        Ok(SubmitGuard {
            orchestrator: self,
            generation,
        })
    }

    /// Record a failed operation in the session and hand the error back.
    fn fail(
        &self,
        generation: u64,
        err: OrchestratorError,
        event: impl FnOnce(StepError) -> SessionEvent,
    ) -> OrchestratorError {
        self.dispatch_in(generation, event(err.to_step_error()));
        err
    }

    /// Apply an event produced by a call issued under `generation`.
    ///
    /// Returns false, leaving the state untouched, if the session was reset
    /// since then.
    fn dispatch_in(&self, generation: u64, event: SessionEvent) -> bool {
        let state = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.generation() != generation {
            debug!("Dropping {:?} from a previous session", event);
            return false;
        }
        self.apply(state, event);
        true
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, TaskRegistry> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply an event, then bring background tasks in line with the new state.
    ///
    /// Lock order is state, then tasks.
    fn dispatch(&self, event: SessionEvent) -> SessionState {
        let state = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        self.apply(state, event)
    }

    fn apply(
        &self,
        mut state: RwLockWriteGuard<'_, SessionState>,
        event: SessionEvent,
    ) -> SessionState {
        let before = std::mem::take(&mut *state);
        let from = before.step;
        let previous_error = before.error.clone();
        let previous_matching = before.matching.clone();

        let (next, effects) = reduce(before, event);
        *state = next;

        if state.step != from {
            info!("Session step {} -> {}", from, state.step);
            STEP_TRANSITIONS
                .with_label_values(&[from.as_str(), state.step.as_str()])
                .inc();
        }
        if state.error != previous_error {
            if let Some(error) = &state.error {
                warn!("Session error in {} step: {}", state.step, error.message);
                SESSION_ERRORS.with_label_values(&[error.kind.as_str()]).inc();
            }
        }
        if state.matching != previous_matching {
            debug!("Library matching: {:?}", state.matching);
            if let MatchingStatus::Failed { error } = &state.matching {
                warn!("Library matching failed: {}", error);
            }
        }

        let mut tasks = self.lock_tasks();
        tasks.polls.retain(|kind, task| {
            let live = state.is_live(&task.token);
            if !live {
                debug!("Cancelling {} task for job {}", kind.as_str(), task.token.job_id);
                task.cancel.cancel();
            }
            live
        });

        for effect in effects {
            self.run_effect(&mut tasks, effect);
        }

        state.clone()
    }

    fn run_effect(&self, tasks: &mut TaskRegistry, effect: Effect) {
        match effect {
            Effect::StartPolling(token) => {
                if let Some(existing) = tasks.polls.get(&token.kind) {
                    if existing.token == token && !existing.cancel.is_cancelled() {
                        return;
                    }
                }
                let (id, cancel) = self.register(tasks, token.clone());
                tokio::spawn(self.clone().poll_job(token, cancel, id));
            }
            Effect::FetchResults(token) => {
                let (id, cancel) = self.register(tasks, token.clone());
                tokio::spawn(self.clone().fetch_results(token, cancel, id));
            }
            Effect::StartCatalogMatch { job_id } => {
                let cancel = tasks.session.child_token();
                let generation = self.generation();
                tokio::spawn(self.clone().start_catalog_match(job_id, generation, cancel));
            }
        }
    }

    /// Track a task under its kind, cancelling whatever ran there before.
    fn register(&self, tasks: &mut TaskRegistry, token: PollToken) -> (u64, CancellationToken) {
        let id = self.inner.next_task_id.fetch_add(1, Ordering::Relaxed);
        let cancel = tasks.session.child_token();
        let task = PollTask {
            id,
            token: token.clone(),
            cancel: cancel.clone(),
        };
        if let Some(previous) = tasks.polls.insert(token.kind, task) {
            previous.cancel.cancel();
        }
        (id, cancel)
    }

    fn forget(&self, kind: PollKind, id: u64) {
        let mut tasks = self.lock_tasks();
        if tasks.polls.get(&kind).is_some_and(|t| t.id == id) {
            tasks.polls.remove(&kind);
        }
    }

    async fn poll_job(self, token: PollToken, cancel: CancellationToken, id: u64) {
        let interval = match token.kind {
            PollKind::CatalogMatch => self.inner.config.match_poll_interval(),
            _ => self.inner.config.job_poll_interval(),
        };
        debug!(
            "{} polling started for job {} ({} step)",
            token.kind.as_str(),
            token.job_id,
            token.step
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            POLL_TICKS.with_label_values(&[token.kind.as_str()]).inc();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.inner.service.job_status(&token.job_id) => outcome,
            };

            let event = match outcome {
                Ok(job) => {
                    debug!(
                        "Job {} is {} ({}%): {}",
                        job.job_id,
                        job.status.as_str(),
                        job.progress,
                        job.message
                    );
                    SessionEvent::JobPolled {
                        token: token.clone(),
                        job,
                    }
                }
                Err(e) => {
                    warn!("Failed to poll job {}: {}", token.job_id, e);
                    SessionEvent::PollFailed {
                        token: token.clone(),
                        error: StepError::from_service(&e),
                    }
                }
            };

            if !self.dispatch(event).is_live(&token) {
                break;
            }
        }

        self.forget(token.kind, id);
        debug!("{} polling stopped for job {}", token.kind.as_str(), token.job_id);
    }

    async fn fetch_results(self, token: PollToken, cancel: CancellationToken, id: u64) {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            outcome = self.inner.service.results(&token.job_id) => Some(outcome),
        };

        match outcome {
            Some(Ok(results)) => {
                info!("Loaded {} results for job {}", results.len(), token.job_id);
                self.dispatch(SessionEvent::ResultsLoaded {
                    token: token.clone(),
                    results,
                });
            }
            Some(Err(e)) => {
                warn!("Failed to load results for job {}: {}", token.job_id, e);
                self.dispatch(SessionEvent::ResultsFailed {
                    token: token.clone(),
                    error: StepError::from_service(&e),
                });
            }
            None => {}
        }

        self.forget(token.kind, id);
    }

    async fn start_catalog_match(
        self,
        job_id: String,
        generation: u64,
        cancel: CancellationToken,
    ) {
        info!("Starting library matching for job {}", job_id);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return,
            outcome = self.inner.service.start_catalog_match(&job_id) => outcome,
        };

        match outcome {
            Ok(ack) => {
                debug!("Library matching accepted: {} {}", ack.status, ack.message);
                self.dispatch_in(generation, SessionEvent::MatchingAccepted { job_id });
            }
            Err(e) => {
                self.dispatch_in(
                    generation,
                    SessionEvent::MatchingRejected {
                        job_id,
                        error: StepError::from_service(&e),
                    },
                );
            }
        }
    }
}
