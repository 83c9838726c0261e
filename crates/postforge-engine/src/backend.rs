use anyhow::{bail, Context, Result};
use postforge_contracts::content::result_rows;
use postforge_contracts::jobs::{JobCreated, StatusReport};
use postforge_contracts::requests::GenerationRequest;
use postforge_contracts::topics::{parse_topic_list, Topic};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::config::EngineConfig;

/// The remote generation service. Results come back as raw JSON rows; the
/// orchestrator normalizes them.
pub trait GenerationBackend: Send + Sync {
    fn create_job(&self, request: &GenerationRequest) -> Result<JobCreated>;
    fn job_status(&self, job_id: &str) -> Result<StatusReport>;
    fn job_results(&self, job_id: &str) -> Result<Vec<Value>>;
    fn list_topics(&self) -> Result<Vec<Topic>>;
    fn get_topic(&self, topic_id: &str) -> Result<Topic>;
    fn results_for_topic(&self, topic_id: &str) -> Result<Vec<Value>>;
}

pub struct HttpBackend {
    api_base: String,
    api_token: Option<String>,
    http: HttpClient,
}

impl HttpBackend {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.http_timeout)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            http,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)
            .with_context(|| format!("invalid API base URL ({})", self.api_base))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API base cannot carry a path ({})", self.api_base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get_json(&self, label: &str, url: Url) -> Result<Value> {
        debug!(%url, "GET");
        let mut request = self.http.get(url.clone());
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .with_context(|| format!("{label} request failed ({url})"))?;
        response_json_or_error(label, response)
    }
}

impl GenerationBackend for HttpBackend {
    fn create_job(&self, request: &GenerationRequest) -> Result<JobCreated> {
        let url = self.endpoint(&["generate"])?;
        debug!(%url, topic_id = %request.topic_id, "POST");
        let mut builder = self.http.post(url.clone()).json(request);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder
            .send()
            .with_context(|| format!("generate request failed ({url})"))?;
        let payload = response_json_or_error("generate", response)?;
        let created: JobCreated = serde_json::from_value(payload.clone()).with_context(|| {
            format!(
                "generate response missing job id: {}",
                truncate_text(&payload.to_string(), 512)
            )
        })?;
        if created.job_id.trim().is_empty() {
            bail!("generate response returned an empty job id");
        }
        Ok(created)
    }

    fn job_status(&self, job_id: &str) -> Result<StatusReport> {
        let payload = self.get_json("job status", self.endpoint(&["jobs", job_id, "status"])?)?;
        let mut report: StatusReport =
            serde_json::from_value(payload).context("failed to parse job status")?;
        if report.job_id.is_empty() {
            report.job_id = job_id.to_string();
        }
        Ok(report)
    }

    fn job_results(&self, job_id: &str) -> Result<Vec<Value>> {
        let payload = self.get_json("job results", self.endpoint(&["jobs", job_id, "results"])?)?;
        Ok(result_rows(&payload))
    }

    fn list_topics(&self) -> Result<Vec<Topic>> {
        let payload = self.get_json("topics", self.endpoint(&["topics"])?)?;
        parse_topic_list(&payload)
    }

    fn get_topic(&self, topic_id: &str) -> Result<Topic> {
        let payload = self.get_json("topic", self.endpoint(&["topics", topic_id])?)?;
        let payload = payload.get("topic").cloned().unwrap_or(payload);
        serde_json::from_value(payload).context("failed to parse topic")
    }

    fn results_for_topic(&self, topic_id: &str) -> Result<Vec<Value>> {
        let mut url = self.endpoint(&["results"])?;
        url.query_pairs_mut().append_pair("topicId", topic_id);
        let payload = self.get_json("topic results", url)?;
        Ok(result_rows(&payload))
    }
}

pub(crate) fn response_json_or_error(label: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("failed reading {label} response body"))?;
    if !status.is_success() {
        bail!(
            "{label} request failed ({}): {}",
            status.as_u16(),
            truncate_text(&body, 512)
        );
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).with_context(|| {
        format!(
            "{label} returned invalid JSON: {}",
            truncate_text(&body, 512)
        )
    })
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out = value.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{truncate_text, HttpBackend};
    use crate::config::EngineConfig;

    fn config(api_base: &str) -> EngineConfig {
        EngineConfig {
            api_base: api_base.to_string(),
            http_timeout: Duration::from_secs(1),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn endpoint_appends_escaped_segments() -> anyhow::Result<()> {
        let backend = HttpBackend::new(&config("http://localhost:8000/api/"))?;
        assert_eq!(backend.api_base(), "http://localhost:8000/api");
        let url = backend.endpoint(&["jobs", "abc/def", "status"])?;
        assert_eq!(url.as_str(), "http://localhost:8000/api/jobs/abc%2Fdef/status");
        Ok(())
    }

    #[test]
    fn endpoint_rejects_unparseable_base() -> anyhow::Result<()> {
        let backend = HttpBackend::new(&config("not a url"))?;
        assert!(backend.endpoint(&["generate"]).is_err());
        Ok(())
    }

    #[test]
    fn truncate_text_marks_cut() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
    }
}
