mod job;
mod status;

pub use job::{Job, JobCreated, JobProgress, StatusReport, Transition};
pub use status::JobStatus;
