use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::status::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobProgress {
    #[serde(default)]
    pub done: u64,
    #[serde(default)]
    pub total: u64,
}

/// Response of `POST /generate`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobCreated {
    #[serde(alias = "jobId", alias = "id")]
    pub job_id: String,
    #[serde(default = "pending_status")]
    pub status: JobStatus,
    #[serde(default, deserialize_with = "lenient_errors")]
    pub errors: Vec<String>,
}

/// Response of `GET /jobs/{id}/status`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusReport {
    #[serde(default, alias = "jobId")]
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub progress: Option<JobProgress>,
    #[serde(default, deserialize_with = "lenient_errors")]
    pub errors: Vec<String>,
}

fn pending_status() -> JobStatus {
    JobStatus::Pending
}

fn lenient_errors<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let rows = match value {
        Value::Null => Vec::new(),
        Value::Array(rows) => rows,
        other => vec![other],
    };
    Ok(rows
        .iter()
        .filter_map(|row| match row {
            Value::String(text) => Some(text.clone()),
            Value::Object(obj) => obj
                .get("message")
                .or_else(|| obj.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| Some(row.to_string())),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .collect())
}

/// Outcome of folding one status report into a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advanced { from: JobStatus, to: JobStatus },
    /// Same status; progress and errors refreshed.
    Refreshed,
    /// Report would move the job backwards or out of a terminal state.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
}

impl Job {
    pub fn new(job_id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            created_at: now_utc_iso(),
            errors: Vec::new(),
            progress: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn apply(&mut self, report: &StatusReport) -> Transition {
        let transition = if self.status == report.status && !self.is_terminal() {
            Transition::Refreshed
        } else if self.status.can_advance_to(report.status) {
            Transition::Advanced {
                from: self.status,
                to: report.status,
            }
        } else {
            return Transition::Ignored;
        };

        self.status = report.status;
        if let Some(created_at) = report.created_at.as_deref().filter(|v| !v.is_empty()) {
            self.created_at = created_at.to_string();
        }
        if report.progress.is_some() {
            self.progress = report.progress;
        }
        if !report.errors.is_empty() {
            self.errors = report.errors.clone();
        }
        transition
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
