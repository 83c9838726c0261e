//! Job orchestration for multi-platform content generation: the HTTP
//! backend, per-job status watchers, the job tracker and the orchestrator
//! that ties them to the result store.

pub mod backend;
pub mod config;
pub mod orchestrator;
pub mod tracker;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use backend::{GenerationBackend, HttpBackend};
pub use config::EngineConfig;
pub use orchestrator::{
    DisplayContract, Notice, NoticeKind, NoticeLevel, Orchestrator, OrchestratorError,
};
pub use tracker::{JobHandle, JobSnapshot, JobTracker, ResultsPull, TrackerEvent};
pub use watcher::{JobUpdate, JobWatcher, PollingWatcher, WatchHandle};
