use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use postforge_contracts::jobs::{JobCreated, JobStatus, StatusReport};
use postforge_contracts::requests::GenerationRequest;
use postforge_contracts::topics::Topic;
use serde_json::Value;

use crate::backend::GenerationBackend;

/// In-process backend driven by per-job scripts. The last scripted entry
/// repeats once a script runs out.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    state: Mutex<ScriptState>,
}

#[derive(Default)]
struct ScriptState {
    next_job: u64,
    submit_failure: Option<String>,
    created: Option<(JobStatus, Vec<String>)>,
    submitted: Vec<GenerationRequest>,
    statuses: HashMap<String, VecDeque<Result<JobStatus, String>>>,
    job_errors: HashMap<String, Vec<String>>,
    results: HashMap<String, VecDeque<Result<Vec<Value>, String>>>,
    topics: Vec<Topic>,
    topic_results: HashMap<String, Vec<Value>>,
    status_calls: HashMap<String, usize>,
    results_calls: HashMap<String, usize>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script_status(&self, job_id: &str, statuses: &[JobStatus]) {
        self.script_status_results(job_id, statuses.iter().copied().map(Ok).collect());
    }

    pub(crate) fn script_status_results(&self, job_id: &str, script: Vec<Result<JobStatus, String>>) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(job_id.to_string(), script.into());
    }

    pub(crate) fn script_job_errors(&self, job_id: &str, errors: &[&str]) {
        self.state.lock().unwrap().job_errors.insert(
            job_id.to_string(),
            errors.iter().map(|error| error.to_string()).collect(),
        );
    }

    pub(crate) fn script_results(&self, job_id: &str, script: Vec<Result<Vec<Value>, String>>) {
        self.state
            .lock()
            .unwrap()
            .results
            .insert(job_id.to_string(), script.into());
    }

    pub(crate) fn fail_submit(&self, message: &str) {
        self.state.lock().unwrap().submit_failure = Some(message.to_string());
    }

    /// Status (and inline errors) every later `create_job` reports.
    pub(crate) fn script_created(&self, status: JobStatus, errors: &[&str]) {
        self.state.lock().unwrap().created = Some((
            status,
            errors.iter().map(|error| error.to_string()).collect(),
        ));
    }

    pub(crate) fn set_topics(&self, topics: Vec<Topic>) {
        self.state.lock().unwrap().topics = topics;
    }

    pub(crate) fn set_topic_results(&self, topic_id: &str, rows: Vec<Value>) {
        self.state
            .lock()
            .unwrap()
            .topic_results
            .insert(topic_id.to_string(), rows);
    }

    pub(crate) fn submitted(&self) -> Vec<GenerationRequest> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub(crate) fn status_calls(&self, job_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .status_calls
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn results_calls(&self, job_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .results_calls
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }
}

fn next_scripted<T: Clone>(script: &mut VecDeque<Result<T, String>>) -> Option<Result<T, String>> {
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

impl GenerationBackend for ScriptedBackend {
    fn create_job(&self, request: &GenerationRequest) -> Result<JobCreated> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.submit_failure.clone() {
            return Err(anyhow!(message));
        }
        state.next_job += 1;
        state.submitted.push(request.clone());
        let (status, errors) = state
            .created
            .clone()
            .unwrap_or((JobStatus::Pending, Vec::new()));
        Ok(JobCreated {
            job_id: format!("job-{}", state.next_job),
            status,
            errors,
        })
    }

    fn job_status(&self, job_id: &str) -> Result<StatusReport> {
        let mut state = self.state.lock().unwrap();
        *state.status_calls.entry(job_id.to_string()).or_insert(0) += 1;
        let next = state
            .statuses
            .get_mut(job_id)
            .and_then(next_scripted)
            .unwrap_or(Ok(JobStatus::Running));
        let status = next.map_err(|message| anyhow!(message))?;
        let errors = if status == JobStatus::Error {
            state.job_errors.get(job_id).cloned().unwrap_or_default()
        } else {
            Vec::new()
        };
        Ok(StatusReport {
            job_id: job_id.to_string(),
            status,
            created_at: None,
            progress: None,
            errors,
        })
    }

    fn job_results(&self, job_id: &str) -> Result<Vec<Value>> {
        let mut state = self.state.lock().unwrap();
        *state.results_calls.entry(job_id.to_string()).or_insert(0) += 1;
        state
            .results
            .get_mut(job_id)
            .and_then(next_scripted)
            .unwrap_or_else(|| Ok(Vec::new()))
            .map_err(|message| anyhow!(message))
    }

    fn list_topics(&self) -> Result<Vec<Topic>> {
        Ok(self.state.lock().unwrap().topics.clone())
    }

    fn get_topic(&self, topic_id: &str) -> Result<Topic> {
        self.state
            .lock()
            .unwrap()
            .topics
            .iter()
            .find(|topic| topic.id == topic_id)
            .cloned()
            .ok_or_else(|| anyhow!("topic {topic_id} not found"))
    }

    fn results_for_topic(&self, topic_id: &str) -> Result<Vec<Value>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .topic_results
            .get(topic_id)
            .cloned()
            .unwrap_or_default())
    }
}
