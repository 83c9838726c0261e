use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::platforms::{canonical_format, canonical_platform};
use crate::topics::{optional_id_string, value_to_id};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub content: Value,
}

/// One generated artifact for a single platform/format pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub platform: String,
    pub format: String,
    #[serde(default, deserialize_with = "optional_id_string")]
    pub topic_id: Option<String>,
    pub envelope: Envelope,
}

impl JobResult {
    pub fn content(&self) -> &Value {
        &self.envelope.content
    }

    pub fn type_key(&self) -> String {
        format!("{}:{}", self.platform, self.format)
    }
}

/// Reduces a raw backend result to the canonical shape. Never fails:
/// anything missing becomes an empty string or `{}`.
pub fn normalize(raw: &Value) -> JobResult {
    let empty = Map::new();
    let obj = raw.as_object().unwrap_or(&empty);

    let mut platform = text_field(obj, &["platform"]);
    let mut format = text_field(obj, &["format", "content_type", "contentType"]);
    if format.is_empty() {
        if let Some((head, tail)) = platform.split_once(':') {
            let (head, tail) = (head.trim().to_string(), tail.trim().to_string());
            platform = head;
            format = tail;
        }
    }

    let platform = canonical_platform(&platform);

    let content = obj
        .get("envelope")
        .and_then(Value::as_object)
        .and_then(|envelope| envelope.get("content"))
        .or_else(|| obj.get("content"))
        .cloned()
        .unwrap_or(Value::Null);

    JobResult {
        job_id: id_field(obj, &["job_id", "jobId"]).unwrap_or_default(),
        platform,
        format,
        topic_id: id_field(obj, &["topic_id", "topicId"]),
        envelope: Envelope {
            content: normalize_content(content),
        },
    }
}

/// Re-applies the unwrap rules to an already-typed result.
pub fn normalize_result(mut result: JobResult) -> JobResult {
    let content = std::mem::take(&mut result.envelope.content);
    result.envelope.content = normalize_content(content);
    result.platform = canonical_platform(&result.platform);
    result.format = canonical_format(&result.format);
    result
}

/// Strips `{meta, content}` wrappers and singleton arrays. Upstream only ever
/// sends one level, but the rules are applied until neither matches so the
/// output is always a fixed point.
pub fn normalize_content(mut content: Value) -> Value {
    loop {
        content = match content {
            Value::Object(mut obj) if obj.contains_key("meta") && obj.contains_key("content") => {
                obj.remove("content").unwrap_or(Value::Null)
            }
            Value::Array(rows) => rows
                .into_iter()
                .next()
                .unwrap_or_else(|| Value::Object(Map::new())),
            Value::Null => return Value::Object(Map::new()),
            other => return other,
        };
    }
}

/// Extracts the result rows from `{results: [...]}`, `{data: [...]}` or a
/// bare array.
pub fn result_rows(payload: &Value) -> Vec<Value> {
    match payload {
        Value::Array(rows) => rows.clone(),
        Value::Object(obj) => obj
            .get("results")
            .or_else(|| obj.get("data"))
            .or_else(|| obj.get("items"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find_map(Value::as_str)
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

fn id_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find_map(value_to_id)
}
