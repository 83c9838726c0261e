use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Read-only reference data describing one system design topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub complexity_level: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Topic {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            company: None,
            complexity_level: None,
            difficulty: None,
            tags: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// Explicit `null` reads the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Topic ids come back as numbers from some endpoints and strings from others.
pub(crate) fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_id(&value).unwrap_or_default())
}

pub(crate) fn optional_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_id(&value))
}

pub(crate) fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()).filter(|text| !text.is_empty()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Accepts either a bare array of topics or `{topics: [...]}` / `{items: [...]}`.
pub fn parse_topic_list(payload: &Value) -> anyhow::Result<Vec<Topic>> {
    let rows = match payload {
        Value::Array(_) => payload.clone(),
        Value::Object(obj) => obj
            .get("topics")
            .or_else(|| obj.get("items"))
            .or_else(|| obj.get("data"))
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())),
        _ => anyhow::bail!("unexpected topic list payload: {payload}"),
    };
    Ok(serde_json::from_value(rows)?)
}
