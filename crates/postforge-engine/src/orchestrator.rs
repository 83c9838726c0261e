use std::sync::Arc;
use std::time::{Duration, Instant};

use postforge_contracts::content::{normalize, JobResult, ResultStore};
use postforge_contracts::events::{EventLog, OrchestrationEvent};
use postforge_contracts::jobs::JobStatus;
use postforge_contracts::platforms::{generic_fields, GenericField, PlatformRegistry, RenderKey};
use postforge_contracts::requests::{build_request, RequestOptions, ValidationError};
use postforge_contracts::topics::Topic;
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::GenerationBackend;
use crate::config::EngineConfig;
use crate::tracker::{JobHandle, JobSnapshot, JobTracker, TrackerEvent};
use crate::watcher::{JobWatcher, PollingWatcher};

const IDLE_PUMP_WAIT: Duration = Duration::from_millis(25);
const MAX_NOTICES: usize = 200;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },
    #[error("job {0} is not tracked")]
    UnknownJob(String),
    #[error("job {job_id} is {status}; results are only available once it is done")]
    NotDone { job_id: String, status: JobStatus },
}

impl OrchestratorError {
    fn transport(operation: &'static str, err: anyhow::Error) -> Self {
        Self::Transport {
            operation,
            message: format!("{err:#}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    SubmitFailed,
    PollFailed,
    JobFailed,
    TimedOut,
    ResultsReady,
    ResultsFailed,
}

/// A non-blocking, user-facing message (toast or inline banner).
///
/// Repeated poll failures for one job collapse into a single notice whose
/// `repeats` counts the extra occurrences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub kind: NoticeKind,
    pub job_id: Option<String>,
    pub message: String,
    pub repeats: u32,
}

/// How a stored result should be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayContract {
    Registered { key: RenderKey, label: String },
    Generic { fields: Vec<GenericField> },
}

impl DisplayContract {
    pub fn key(&self) -> RenderKey {
        match self {
            Self::Registered { key, .. } => *key,
            Self::Generic { .. } => RenderKey::GENERIC,
        }
    }
}

/// Top-level owner of job tracking, the result store and display routing.
///
/// All state changes happen on the thread that calls into the orchestrator.
/// Watchers only queue updates; [`Orchestrator::pump`] applies them.
pub struct Orchestrator {
    backend: Arc<dyn GenerationBackend>,
    tracker: JobTracker,
    store: ResultStore,
    registry: PlatformRegistry,
    request_options: RequestOptions,
    events: Option<EventLog>,
    notices: Vec<Notice>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: &EngineConfig) -> Self {
        let watcher = Arc::new(PollingWatcher::new(config.poll_interval, config.max_watch));
        let mut orchestrator = Self::with_watcher(
            backend,
            watcher,
            RequestOptions {
                brand: config.brand.clone(),
                ..RequestOptions::default()
            },
        );
        if let Some(path) = &config.events_path {
            match EventLog::open(path, session_id()) {
                Ok(log) => orchestrator.set_event_log(log),
                Err(err) => warn!(
                    path = %path.display(),
                    error = %format!("{err:#}"),
                    "event log disabled"
                ),
            }
        }
        orchestrator
    }

    pub fn with_watcher(
        backend: Arc<dyn GenerationBackend>,
        watcher: Arc<dyn JobWatcher>,
        request_options: RequestOptions,
    ) -> Self {
        Self {
            tracker: JobTracker::new(Arc::clone(&backend), watcher),
            backend,
            store: ResultStore::new(),
            registry: PlatformRegistry::default(),
            request_options,
            events: None,
            notices: Vec::new(),
        }
    }

    pub fn set_event_log(&mut self, events: EventLog) {
        self.events = Some(events);
        self.emit(OrchestrationEvent::SessionStarted);
    }

    pub fn request_options(&self) -> &RequestOptions {
        &self.request_options
    }

    pub fn set_request_options(&mut self, options: RequestOptions) {
        self.request_options = options;
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &dyn GenerationBackend {
        self.backend.as_ref()
    }

    pub fn topics(&self) -> Result<Vec<Topic>, OrchestratorError> {
        self.backend
            .list_topics()
            .map_err(|err| OrchestratorError::transport("list topics", err))
    }

    pub fn topic(&self, topic_id: &str) -> Result<Topic, OrchestratorError> {
        self.backend
            .get_topic(topic_id)
            .map_err(|err| OrchestratorError::transport("load topic", err))
    }

    pub fn jobs(&self) -> Vec<JobSnapshot> {
        self.tracker.snapshots()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Validates, submits and starts watching one job for `topic`.
    pub fn generate(
        &mut self,
        topic: Option<&Topic>,
        platforms: &[String],
    ) -> Result<JobHandle, OrchestratorError> {
        let options = self.request_options.clone();
        self.generate_with(topic, platforms, &options)
    }

    pub fn generate_with(
        &mut self,
        topic: Option<&Topic>,
        platforms: &[String],
        options: &RequestOptions,
    ) -> Result<JobHandle, OrchestratorError> {
        let request = build_request(topic, platforms, options)?;
        match self.tracker.submit(&request) {
            Ok(handle) => {
                self.emit(OrchestrationEvent::JobSubmitted {
                    job_id: handle.job_id.clone(),
                    topic_id: handle.topic_id.clone(),
                    targets: request.target_platforms.clone(),
                });
                self.settle_created(&handle.job_id);
                Ok(handle)
            }
            Err(err) => {
                let err = OrchestratorError::transport("submit", err);
                self.notify(NoticeLevel::Error, NoticeKind::SubmitFailed, None, err.to_string());
                Err(err)
            }
        }
    }

    /// A job created already terminal gets no watcher, so its outcome is
    /// handled here.
    fn settle_created(&mut self, job_id: &str) {
        match self.tracker.get(job_id).map(|job| job.status) {
            Some(JobStatus::Done) => self.handle_event(TrackerEvent::Finished {
                job_id: job_id.to_string(),
            }),
            Some(JobStatus::Error) => {
                let errors = self.tracker.load_errors(job_id).unwrap_or_else(|err| {
                    warn!(job_id, error = %format!("{err:#}"), "could not load job errors");
                    Vec::new()
                });
                self.handle_event(TrackerEvent::Failed {
                    job_id: job_id.to_string(),
                    errors,
                });
            }
            _ => {}
        }
    }

    /// One job per topic. Each topic succeeds or fails on its own.
    pub fn generate_many(
        &mut self,
        topics: &[Topic],
        platforms: &[String],
    ) -> Vec<Result<JobHandle, OrchestratorError>> {
        topics
            .iter()
            .map(|topic| self.generate(Some(topic), platforms))
            .collect()
    }

    /// Applies queued watcher updates, waiting up to `wait` for the first.
    /// Returns how many updates were consumed.
    pub fn pump(&mut self, wait: Duration) -> usize {
        let mut handled = 0;
        let mut next = self.tracker.next_update(wait);
        while let Some(update) = next {
            handled += 1;
            if let Some(event) = self.tracker.apply(update) {
                self.handle_event(event);
            }
            next = self.tracker.next_update(Duration::ZERO);
        }
        handled
    }

    /// Pumps until no job is being watched or `timeout` passes. Returns
    /// whether everything settled.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let started = Instant::now();
        loop {
            let idle = !self.tracker.has_live_watches();
            let handled = self.pump(Duration::ZERO);
            if idle && handled == 0 {
                return true;
            }
            if started.elapsed() >= timeout {
                return false;
            }
            if handled == 0 {
                self.pump(IDLE_PUMP_WAIT);
            }
        }
    }

    /// Fetches the job's status right now instead of waiting for the watcher.
    pub fn poll_now(&mut self, job_id: &str) -> Result<JobStatus, OrchestratorError> {
        if self.tracker.get(job_id).is_none() {
            return Err(OrchestratorError::UnknownJob(job_id.to_string()));
        }
        match self.tracker.poll(job_id) {
            Ok(Some(event)) => self.handle_event(event),
            Ok(None) => {}
            Err(err) => {
                let err = OrchestratorError::transport("poll", err);
                self.notify(
                    NoticeLevel::Warning,
                    NoticeKind::PollFailed,
                    Some(job_id),
                    err.to_string(),
                );
                return Err(err);
            }
        }
        Ok(self
            .tracker
            .get(job_id)
            .map(|job| job.status)
            .unwrap_or(JobStatus::Done))
    }

    /// User-initiated second attempt at pulling results after the automatic
    /// fetch failed.
    pub fn retry_results(&mut self, job_id: &str) -> Result<usize, OrchestratorError> {
        let status = self
            .tracker
            .get(job_id)
            .map(|job| job.status)
            .ok_or_else(|| OrchestratorError::UnknownJob(job_id.to_string()))?;
        if status != JobStatus::Done {
            return Err(OrchestratorError::NotDone {
                job_id: job_id.to_string(),
                status,
            });
        }
        self.pull_results(job_id)
    }

    /// Loads previously generated results for a topic into the store.
    pub fn seed_topic(&mut self, topic_id: &str) -> Result<usize, OrchestratorError> {
        let rows = self
            .backend
            .results_for_topic(topic_id)
            .map_err(|err| OrchestratorError::transport("load results", err))?;
        let mut added = 0;
        for row in &rows {
            let mut result = normalize(row);
            if result.topic_id.is_none() {
                result.topic_id = Some(topic_id.to_string());
            }
            if self.store.add(result) {
                added += 1;
            }
        }
        info!(topic_id, fetched = rows.len(), added, "seeded results");
        Ok(added)
    }

    pub fn dismiss(&mut self, job_id: &str) -> bool {
        let dismissed = self.tracker.dismiss(job_id).is_some();
        if dismissed {
            self.emit(OrchestrationEvent::JobDismissed {
                job_id: job_id.to_string(),
            });
        }
        dismissed
    }

    pub fn display(&self, result: &JobResult) -> DisplayContract {
        match self.registry.get(&result.platform, &result.format) {
            Some(spec) => DisplayContract::Registered {
                key: spec.key,
                label: spec.label.clone(),
            },
            None => DisplayContract::Generic {
                fields: generic_fields(result.content()),
            },
        }
    }

    /// Cancels all watchers. Updates still in flight are never applied.
    pub fn shutdown(&mut self) {
        self.tracker.shutdown();
    }

    fn handle_event(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::Progressed { job_id, status } => {
                let progress = self.tracker.get(&job_id).and_then(|job| job.progress);
                self.emit(OrchestrationEvent::StatusChanged {
                    job_id,
                    status,
                    progress,
                });
            }
            TrackerEvent::Finished { job_id } => {
                self.emit(OrchestrationEvent::JobFinished {
                    job_id: job_id.clone(),
                    status: JobStatus::Done,
                    errors: Vec::new(),
                });
                // Failures are already recorded as notices inside pull_results.
                let _ = self.pull_results(&job_id);
            }
            TrackerEvent::Failed { job_id, errors } => {
                let message = if errors.is_empty() {
                    "generation failed".to_string()
                } else {
                    errors.join("; ")
                };
                self.emit(OrchestrationEvent::JobFinished {
                    job_id: job_id.clone(),
                    status: JobStatus::Error,
                    errors,
                });
                self.notify(NoticeLevel::Error, NoticeKind::JobFailed, Some(&job_id), message);
            }
            TrackerEvent::PollFailed { job_id, message } => {
                self.emit(OrchestrationEvent::JobPollFailed {
                    job_id: job_id.clone(),
                    error: message.clone(),
                });
                self.notify(
                    NoticeLevel::Warning,
                    NoticeKind::PollFailed,
                    Some(&job_id),
                    format!("status check failed, retrying: {message}"),
                );
            }
            TrackerEvent::TimedOut { job_id, elapsed } => {
                let elapsed_s = elapsed.as_secs_f64();
                self.emit(OrchestrationEvent::JobTimedOut {
                    job_id: job_id.clone(),
                    elapsed_s,
                });
                self.notify(
                    NoticeLevel::Warning,
                    NoticeKind::TimedOut,
                    Some(&job_id),
                    format!("stopped waiting after {elapsed_s:.0}s; the job may still finish"),
                );
            }
        }
    }

    fn pull_results(&mut self, job_id: &str) -> Result<usize, OrchestratorError> {
        let topic_id = self.tracker.topic_of(job_id).map(str::to_string);
        let rows = match self.backend.job_results(job_id) {
            Ok(rows) => rows,
            Err(err) => {
                let err = OrchestratorError::transport("fetch results", err);
                self.tracker.mark_results_failed(job_id, err.to_string());
                self.emit(OrchestrationEvent::ResultsFetchFailed {
                    job_id: job_id.to_string(),
                    error: err.to_string(),
                });
                self.notify(
                    NoticeLevel::Error,
                    NoticeKind::ResultsFailed,
                    Some(job_id),
                    err.to_string(),
                );
                return Err(err);
            }
        };

        let mut added = 0;
        for row in &rows {
            let mut result = normalize(row);
            if result.job_id.is_empty() {
                result.job_id = job_id.to_string();
            }
            if result.topic_id.is_none() {
                result.topic_id = topic_id.clone();
            }
            if self.store.add(result) {
                added += 1;
            }
        }
        self.tracker.retire(job_id);

        info!(job_id, fetched = rows.len(), added, "results stored");
        self.emit(OrchestrationEvent::ResultsStored {
            job_id: job_id.to_string(),
            topic_id,
            fetched: rows.len(),
            added,
        });
        if rows.is_empty() {
            self.notify(
                NoticeLevel::Warning,
                NoticeKind::ResultsReady,
                Some(job_id),
                "job finished without results".to_string(),
            );
        } else {
            self.notify(
                NoticeLevel::Info,
                NoticeKind::ResultsReady,
                Some(job_id),
                format!("{added} new result(s) ready"),
            );
        }
        Ok(added)
    }

    fn notify(
        &mut self,
        level: NoticeLevel,
        kind: NoticeKind,
        job_id: Option<&str>,
        message: String,
    ) {
        if kind == NoticeKind::PollFailed {
            let pending = self
                .notices
                .iter_mut()
                .find(|notice| notice.kind == kind && notice.job_id.as_deref() == job_id);
            if let Some(notice) = pending {
                notice.message = message;
                notice.repeats = notice.repeats.saturating_add(1);
                return;
            }
        }
        if self.notices.len() >= MAX_NOTICES {
            self.notices.remove(0);
        }
        self.notices.push(Notice {
            level,
            kind,
            job_id: job_id.map(str::to_string),
            message,
            repeats: 0,
        });
    }

    fn emit(&self, event: OrchestrationEvent) {
        let Some(events) = &self.events else {
            return;
        };
        if let Err(err) = events.record(event) {
            warn!(error = %format!("{err:#}"), "failed to write event");
        }
    }
}

fn session_id() -> String {
    format!("session-{}", uuid::Uuid::new_v4())
}
