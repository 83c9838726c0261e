use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use postforge_contracts::jobs::{Job, JobProgress, JobStatus, StatusReport, Transition};
use postforge_contracts::requests::GenerationRequest;
use tracing::{debug, info, warn};

use crate::backend::GenerationBackend;
use crate::watcher::{JobUpdate, JobWatcher, WatchHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub topic_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultsPull {
    NotStarted,
    Failed(String),
}

/// Read-only view of a tracked job for status panels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub job_id: String,
    pub topic_id: String,
    pub targets: Vec<String>,
    pub status: JobStatus,
    pub created_at: String,
    pub progress: Option<JobProgress>,
    pub errors: Vec<String>,
    pub watching: bool,
    pub results: ResultsPull,
}

/// What the tracker learned from one update, after stale ones are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    Progressed {
        job_id: String,
        status: JobStatus,
    },
    Finished {
        job_id: String,
    },
    Failed {
        job_id: String,
        errors: Vec<String>,
    },
    PollFailed {
        job_id: String,
        message: String,
    },
    TimedOut {
        job_id: String,
        elapsed: Duration,
    },
}

struct TrackedJob {
    job: Job,
    topic_id: String,
    targets: Vec<String>,
    watch_id: u64,
    watch: Option<WatchHandle>,
    results: ResultsPull,
}

impl TrackedJob {
    fn is_watched(&self) -> bool {
        !self.job.is_terminal()
            && self
                .watch
                .as_ref()
                .map(WatchHandle::is_live)
                .unwrap_or(false)
    }

    fn stop_watch(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.cancel();
        }
    }

    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.job.job_id.clone(),
            topic_id: self.topic_id.clone(),
            targets: self.targets.clone(),
            status: self.job.status,
            created_at: self.job.created_at.clone(),
            progress: self.job.progress,
            errors: self.job.errors.clone(),
            watching: self.is_watched(),
            results: self.results.clone(),
        }
    }
}

/// Owns every in-flight job and the watchers feeding it status updates.
///
/// Watchers run on their own threads but never touch job state; they only
/// send [`JobUpdate`]s, which are applied on the owner's thread through
/// [`JobTracker::apply`].
pub struct JobTracker {
    backend: Arc<dyn GenerationBackend>,
    watcher: Arc<dyn JobWatcher>,
    jobs: IndexMap<String, TrackedJob>,
    updates_tx: mpsc::Sender<JobUpdate>,
    updates_rx: mpsc::Receiver<JobUpdate>,
    next_watch_id: u64,
}

impl JobTracker {
    pub fn new(backend: Arc<dyn GenerationBackend>, watcher: Arc<dyn JobWatcher>) -> Self {
        let (updates_tx, updates_rx) = mpsc::channel();
        Self {
            backend,
            watcher,
            jobs: IndexMap::new(),
            updates_tx,
            updates_rx,
            next_watch_id: 0,
        }
    }

    /// Creates the remote job and starts watching it. Nothing is registered
    /// when the create call fails.
    pub fn submit(&mut self, request: &GenerationRequest) -> Result<JobHandle> {
        let created = self
            .backend
            .create_job(request)
            .context("failed to create generation job")?;
        let job_id = created.job_id.clone();
        info!(
            job_id = %job_id,
            topic_id = %request.topic_id,
            targets = ?request.target_platforms,
            status = %created.status,
            "job submitted"
        );

        let mut job = Job::new(job_id.clone(), created.status);
        job.errors = created.errors.clone();
        let mut tracked = TrackedJob {
            job,
            topic_id: request.topic_id.clone(),
            targets: request.target_platforms.clone(),
            watch_id: 0,
            watch: None,
            results: ResultsPull::NotStarted,
        };
        if !created.status.is_terminal() {
            self.start_watch(&mut tracked)?;
        }
        if let Some(mut previous) = self.jobs.insert(job_id.clone(), tracked) {
            previous.stop_watch();
        }

        Ok(JobHandle {
            job_id,
            topic_id: request.topic_id.clone(),
        })
    }

    fn start_watch(&mut self, tracked: &mut TrackedJob) -> Result<()> {
        self.next_watch_id += 1;
        let watch_id = self.next_watch_id;
        let handle = self.watcher.watch(
            &tracked.job.job_id,
            watch_id,
            Arc::clone(&self.backend),
            self.updates_tx.clone(),
        )?;
        tracked.stop_watch();
        tracked.watch_id = watch_id;
        tracked.watch = Some(handle);
        Ok(())
    }

    /// One synchronous status fetch outside the watcher's schedule.
    pub fn poll(&mut self, job_id: &str) -> Result<Option<TrackerEvent>> {
        if !self.jobs.contains_key(job_id) {
            anyhow::bail!("job {job_id} is not tracked");
        }
        let report = self.backend.job_status(job_id)?;
        Ok(self.apply_report(job_id, &report))
    }

    /// Errors recorded for a failed job. When creation reported none, one
    /// status request is made to fetch them.
    pub fn load_errors(&mut self, job_id: &str) -> Result<Vec<String>> {
        let tracked = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| anyhow::anyhow!("job {job_id} is not tracked"))?;
        if tracked.job.errors.is_empty() {
            let report = self.backend.job_status(job_id)?;
            if !report.errors.is_empty() {
                tracked.job.errors = report.errors;
            }
        }
        Ok(tracked.job.errors.clone())
    }

    /// Waits up to `wait` for the next watcher update. A zero wait only
    /// drains what is already queued.
    pub fn next_update(&self, wait: Duration) -> Option<JobUpdate> {
        if wait.is_zero() {
            self.updates_rx.try_recv().ok()
        } else {
            self.updates_rx.recv_timeout(wait).ok()
        }
    }

    /// Folds a watcher update into job state. Updates for jobs that are no
    /// longer tracked, or from a watcher that has since been replaced or
    /// cancelled, are discarded.
    pub fn apply(&mut self, update: JobUpdate) -> Option<TrackerEvent> {
        let Some(tracked) = self.jobs.get_mut(update.job_id()) else {
            debug!(job_id = %update.job_id(), "discarding update for untracked job");
            return None;
        };
        let current_watch = tracked
            .watch
            .as_ref()
            .map(|watch| !watch.is_cancelled())
            .unwrap_or(false);
        if tracked.watch_id != update.watch_id() || !current_watch {
            debug!(
                job_id = %update.job_id(),
                watch_id = update.watch_id(),
                "discarding stale watcher update"
            );
            return None;
        }

        match update {
            JobUpdate::Status { job_id, report, .. } => self.apply_report(&job_id, &report),
            JobUpdate::PollFailed {
                job_id, message, ..
            } => Some(TrackerEvent::PollFailed { job_id, message }),
            JobUpdate::TimedOut {
                job_id, elapsed, ..
            } => {
                tracked.stop_watch();
                warn!(job_id = %job_id, elapsed_s = elapsed.as_secs_f64(), "stopped watching job");
                Some(TrackerEvent::TimedOut { job_id, elapsed })
            }
        }
    }

    fn apply_report(&mut self, job_id: &str, report: &StatusReport) -> Option<TrackerEvent> {
        let tracked = self.jobs.get_mut(job_id)?;
        let transition = tracked.job.apply(report);
        match transition {
            Transition::Ignored => {
                debug!(
                    job_id,
                    current = %tracked.job.status,
                    reported = %report.status,
                    "ignoring non-monotonic status"
                );
                None
            }
            Transition::Refreshed => Some(TrackerEvent::Progressed {
                job_id: job_id.to_string(),
                status: tracked.job.status,
            }),
            Transition::Advanced { from, to } => {
                info!(job_id, %from, %to, "job status changed");
                match to {
                    JobStatus::Done => {
                        tracked.stop_watch();
                        Some(TrackerEvent::Finished {
                            job_id: job_id.to_string(),
                        })
                    }
                    JobStatus::Error => {
                        tracked.stop_watch();
                        Some(TrackerEvent::Failed {
                            job_id: job_id.to_string(),
                            errors: tracked.job.errors.clone(),
                        })
                    }
                    _ => Some(TrackerEvent::Progressed {
                        job_id: job_id.to_string(),
                        status: to,
                    }),
                }
            }
        }
    }

    pub fn mark_results_failed(&mut self, job_id: &str, message: impl Into<String>) {
        if let Some(tracked) = self.jobs.get_mut(job_id) {
            tracked.results = ResultsPull::Failed(message.into());
        }
    }

    /// Drops a job once its results are in the store.
    pub fn retire(&mut self, job_id: &str) -> Option<Job> {
        let mut tracked = self.jobs.shift_remove(job_id)?;
        tracked.stop_watch();
        Some(tracked.job)
    }

    /// Stops watching and forgets a job regardless of its state. Anything its
    /// watcher still delivers is discarded.
    pub fn dismiss(&mut self, job_id: &str) -> Option<Job> {
        let job = self.retire(job_id)?;
        info!(job_id, status = %job.status, "job dismissed");
        Some(job)
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.jobs.get(job_id).map(|tracked| &tracked.job)
    }

    pub fn topic_of(&self, job_id: &str) -> Option<&str> {
        self.jobs
            .get(job_id)
            .map(|tracked| tracked.topic_id.as_str())
    }

    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        self.jobs.values().map(TrackedJob::snapshot).collect()
    }

    pub fn has_live_watches(&self) -> bool {
        self.jobs.values().any(TrackedJob::is_watched)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Cancels every watcher and waits for their threads to exit.
    pub fn shutdown(&mut self) {
        for tracked in self.jobs.values_mut() {
            if let Some(mut watch) = tracked.watch.take() {
                watch.stop_and_join();
            }
        }
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
