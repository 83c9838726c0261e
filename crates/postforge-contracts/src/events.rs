use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::{JobProgress, JobStatus};

/// Lifecycle facts recorded while orchestrating generation jobs. The
/// serialized `type` tag is the snake_case variant name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    SessionStarted,
    JobSubmitted {
        job_id: String,
        topic_id: String,
        targets: Vec<String>,
    },
    #[serde(rename = "job_status")]
    StatusChanged {
        job_id: String,
        status: JobStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<JobProgress>,
    },
    JobPollFailed {
        job_id: String,
        error: String,
    },
    JobFinished {
        job_id: String,
        status: JobStatus,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        errors: Vec<String>,
    },
    JobTimedOut {
        job_id: String,
        elapsed_s: f64,
    },
    ResultsStored {
        job_id: String,
        #[serde(default)]
        topic_id: Option<String>,
        fetched: usize,
        added: usize,
    },
    ResultsFetchFailed {
        job_id: String,
        error: String,
    },
    JobDismissed {
        job_id: String,
    },
}

impl OrchestrationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStarted => "session_started",
            Self::JobSubmitted { .. } => "job_submitted",
            Self::StatusChanged { .. } => "job_status",
            Self::JobPollFailed { .. } => "job_poll_failed",
            Self::JobFinished { .. } => "job_finished",
            Self::JobTimedOut { .. } => "job_timed_out",
            Self::ResultsStored { .. } => "results_stored",
            Self::ResultsFetchFailed { .. } => "results_fetch_failed",
            Self::JobDismissed { .. } => "job_dismissed",
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::SessionStarted => None,
            Self::JobSubmitted { job_id, .. }
            | Self::StatusChanged { job_id, .. }
            | Self::JobPollFailed { job_id, .. }
            | Self::JobFinished { job_id, .. }
            | Self::JobTimedOut { job_id, .. }
            | Self::ResultsStored { job_id, .. }
            | Self::ResultsFetchFailed { job_id, .. }
            | Self::JobDismissed { job_id } => Some(job_id),
        }
    }
}

/// One line of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub session_id: String,
    pub ts: String,
    #[serde(flatten)]
    pub event: OrchestrationEvent,
}

/// JSONL sink for [`OrchestrationEvent`]s. The file is opened once, in
/// append mode, and every record is flushed before `record` returns.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    session_id: String,
    file: Mutex<File>,
}

impl EventLog {
    pub fn open(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open event log {}", path.display()))?;
        Ok(Self {
            path,
            session_id: session_id.into(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn record(&self, event: OrchestrationEvent) -> Result<LoggedEvent> {
        let entry = LoggedEvent {
            session_id: self.session_id.clone(),
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(entry)
    }
}

/// Reads a log back. Blank lines are skipped; anything else that does not
/// parse is an error naming the line.
pub fn read_log(path: &Path) -> Result<Vec<LoggedEvent>> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut events = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: bad event line", path.display(), index + 1))?;
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::{json, Value};

    use super::{read_log, EventLog, OrchestrationEvent};
    use crate::jobs::{JobProgress, JobStatus};

    #[test]
    fn tag_matches_kind_for_every_variant() -> anyhow::Result<()> {
        let events = vec![
            OrchestrationEvent::SessionStarted,
            OrchestrationEvent::JobSubmitted {
                job_id: "j".into(),
                topic_id: "42".into(),
                targets: vec!["medium:article".into()],
            },
            OrchestrationEvent::StatusChanged {
                job_id: "j".into(),
                status: JobStatus::Running,
                progress: Some(JobProgress { done: 1, total: 2 }),
            },
            OrchestrationEvent::JobPollFailed {
                job_id: "j".into(),
                error: "502".into(),
            },
            OrchestrationEvent::JobFinished {
                job_id: "j".into(),
                status: JobStatus::Error,
                errors: vec!["quota".into()],
            },
            OrchestrationEvent::JobTimedOut {
                job_id: "j".into(),
                elapsed_s: 900.0,
            },
            OrchestrationEvent::ResultsStored {
                job_id: "j".into(),
                topic_id: Some("42".into()),
                fetched: 2,
                added: 2,
            },
            OrchestrationEvent::ResultsFetchFailed {
                job_id: "j".into(),
                error: "500".into(),
            },
            OrchestrationEvent::JobDismissed { job_id: "j".into() },
        ];
        for event in events {
            let value = serde_json::to_value(&event)?;
            assert_eq!(value["type"], json!(event.kind()));
        }
        Ok(())
    }

    #[test]
    fn record_appends_lines_that_read_back() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let log = EventLog::open(&path, "session-1")?;

        log.record(OrchestrationEvent::SessionStarted)?;
        let stored = log.record(OrchestrationEvent::JobFinished {
            job_id: "job-7".into(),
            status: JobStatus::Done,
            errors: Vec::new(),
        })?;

        let finished_line = fs::read_to_string(&path)?
            .lines()
            .nth(1)
            .map(str::to_string)
            .unwrap_or_default();
        let raw: Value = serde_json::from_str(&finished_line)?;
        assert_eq!(raw["type"], json!("job_finished"));
        assert_eq!(raw["status"], json!("done"));
        assert!(raw.get("errors").is_none());

        let events = read_log(&path)?;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, OrchestrationEvent::SessionStarted);
        assert_eq!(events[1], stored);
        assert!(events.iter().all(|event| event.session_id == "session-1"));
        Ok(())
    }

    #[test]
    fn reopening_keeps_earlier_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        EventLog::open(&path, "a")?.record(OrchestrationEvent::SessionStarted)?;
        EventLog::open(&path, "b")?.record(OrchestrationEvent::JobDismissed {
            job_id: "job-1".into(),
        })?;

        let sessions = read_log(&path)?
            .into_iter()
            .map(|event| event.session_id)
            .collect::<Vec<_>>();
        assert_eq!(sessions, vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn malformed_line_names_its_position() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        fs::write(&path, "\n{\"type\":\"session_started\",\"session_id\":\"s\",\"ts\":\"t\"}\nnot json\n")?;
        let err = read_log(&path).err().map(|err| format!("{err:#}"));
        assert!(err.is_some_and(|message| message.contains(":3:")));
        Ok(())
    }
}
