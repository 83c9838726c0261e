use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use postforge_contracts::jobs::StatusReport;
use tracing::{debug, warn};

use crate::backend::GenerationBackend;

/// Message from a watcher back to the tracker. `watch_id` identifies the
/// watcher that produced it, so updates from a superseded watcher can be
/// told apart and dropped.
#[derive(Debug, Clone)]
pub enum JobUpdate {
    Status {
        job_id: String,
        watch_id: u64,
        report: StatusReport,
    },
    PollFailed {
        job_id: String,
        watch_id: u64,
        message: String,
    },
    TimedOut {
        job_id: String,
        watch_id: u64,
        elapsed: Duration,
    },
}

impl JobUpdate {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Status { job_id, .. }
            | Self::PollFailed { job_id, .. }
            | Self::TimedOut { job_id, .. } => job_id,
        }
    }

    pub fn watch_id(&self) -> u64 {
        match self {
            Self::Status { watch_id, .. }
            | Self::PollFailed { watch_id, .. }
            | Self::TimedOut { watch_id, .. } => *watch_id,
        }
    }
}

/// Source of status updates for a submitted job. Polling is the default;
/// a push-based implementation only has to deliver the same updates.
pub trait JobWatcher: Send + Sync {
    fn watch(
        &self,
        job_id: &str,
        watch_id: u64,
        backend: Arc<dyn GenerationBackend>,
        updates: mpsc::Sender<JobUpdate>,
    ) -> Result<WatchHandle>;
}

pub struct WatchHandle {
    stop_flag: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl WatchHandle {
    pub fn new(stop_flag: Arc<AtomicBool>, handle: Option<thread::JoinHandle<()>>) -> Self {
        Self { stop_flag, handle }
    }

    /// Asks the watcher to stop without waiting for it.
    pub fn cancel(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    pub fn is_live(&self) -> bool {
        !self.is_cancelled()
            && self
                .handle
                .as_ref()
                .map(|handle| !handle.is_finished())
                .unwrap_or(false)
    }

    pub fn stop_and_join(&mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Fixed-interval polling: no backoff, no jitter, no attempt cap. The only
/// limit is the optional `max_watch` duration.
#[derive(Debug, Clone)]
pub struct PollingWatcher {
    interval: Duration,
    max_watch: Option<Duration>,
}

impl PollingWatcher {
    pub fn new(interval: Duration, max_watch: Option<Duration>) -> Self {
        Self {
            interval,
            max_watch,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_watch(&self) -> Option<Duration> {
        self.max_watch
    }
}

impl JobWatcher for PollingWatcher {
    fn watch(
        &self,
        job_id: &str,
        watch_id: u64,
        backend: Arc<dyn GenerationBackend>,
        updates: mpsc::Sender<JobUpdate>,
    ) -> Result<WatchHandle> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let worker = PollWorker {
            job_id: job_id.to_string(),
            watch_id,
            interval: self.interval,
            max_watch: self.max_watch,
            backend,
            updates,
            stop_flag: Arc::clone(&stop_flag),
        };
        let handle = thread::Builder::new()
            .name(format!("job-watch-{job_id}"))
            .spawn(move || worker.run())
            .with_context(|| format!("failed to spawn watcher for job {job_id}"))?;
        Ok(WatchHandle::new(stop_flag, Some(handle)))
    }
}

struct PollWorker {
    job_id: String,
    watch_id: u64,
    interval: Duration,
    max_watch: Option<Duration>,
    backend: Arc<dyn GenerationBackend>,
    updates: mpsc::Sender<JobUpdate>,
    stop_flag: Arc<AtomicBool>,
}

impl PollWorker {
    fn run(self) {
        let started = Instant::now();
        loop {
            if self.stopped() {
                return;
            }
            if let Some(limit) = self.max_watch {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    let _ = self.updates.send(JobUpdate::TimedOut {
                        job_id: self.job_id.clone(),
                        watch_id: self.watch_id,
                        elapsed,
                    });
                    return;
                }
            }

            let update = match self.backend.job_status(&self.job_id) {
                Ok(report) => {
                    debug!(job_id = %self.job_id, status = %report.status, "polled job");
                    JobUpdate::Status {
                        job_id: self.job_id.clone(),
                        watch_id: self.watch_id,
                        report,
                    }
                }
                Err(err) => {
                    warn!(job_id = %self.job_id, error = %format!("{err:#}"), "job poll failed");
                    JobUpdate::PollFailed {
                        job_id: self.job_id.clone(),
                        watch_id: self.watch_id,
                        message: format!("{err:#}"),
                    }
                }
            };

            // A response that lands after cancellation is dropped here.
            if self.stopped() {
                return;
            }
            let terminal = matches!(
                &update,
                JobUpdate::Status { report, .. } if report.status.is_terminal()
            );
            if self.updates.send(update).is_err() || terminal {
                return;
            }
            self.sleep_interval();
        }
    }

    fn stopped(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    fn sleep_interval(&self) {
        let deadline = Instant::now() + self.interval;
        loop {
            if self.stopped() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(25)));
        }
    }
}
