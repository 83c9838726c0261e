use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::topics::Topic;

pub const DEFAULT_AUDIENCE: &str = "software engineers";
pub const DEFAULT_TONE: &str = "educational";
pub const DEFAULT_LOCALE: &str = "en";
pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";
pub const DEFAULT_UTM_SOURCE: &str = "systemdesign";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("select a topic before generating content")]
    MissingTopic,
    #[error("select at least one target platform")]
    NoPlatforms,
    #[error("platform identifier #{0} is blank")]
    BlankPlatform(usize),
}

/// Site identity attached to every request so generated links and mentions
/// point back at the right places.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandConfig {
    pub site_url: String,
    pub handles: BTreeMap<String, String>,
    pub utm_source: String,
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self {
            site_url: DEFAULT_SITE_URL.to_string(),
            handles: BTreeMap::new(),
            utm_source: DEFAULT_UTM_SOURCE.to_string(),
        }
    }
}

impl BrandConfig {
    /// Parses `platform=@handle,platform=@handle`. Malformed pairs are skipped.
    pub fn parse_handles(raw: &str) -> BTreeMap<String, String> {
        raw.split(',')
            .filter_map(|pair| pair.split_once('='))
            .map(|(platform, handle)| {
                (
                    platform.trim().to_ascii_lowercase(),
                    handle.trim().to_string(),
                )
            })
            .filter(|(platform, handle)| !platform.is_empty() && !handle.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub include_images: bool,
    pub max_length_levels: bool,
    pub force: bool,
    pub length_hint: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            include_images: true,
            max_length_levels: false,
            force: false,
            length_hint: None,
        }
    }
}

/// Caller-supplied knobs for [`build_request`]. Unset text fields fall back
/// to the `DEFAULT_*` constants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub audience: Option<String>,
    pub tone: Option<String>,
    pub locale: Option<String>,
    pub primary_url: Option<String>,
    pub brand: BrandConfig,
    pub generation: GenerationOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandPayload {
    pub site_url: String,
    pub handles: BTreeMap<String, String>,
    pub utm_base: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub topic_id: String,
    pub topic_name: String,
    pub topic_description: String,
    pub audience: String,
    pub tone: String,
    pub locale: String,
    pub primary_url: String,
    pub brand: BrandPayload,
    pub target_platforms: Vec<String>,
    pub options: GenerationOptions,
}

/// Builds the payload for `POST /generate`. Pure; validation failures mean
/// the caller must not submit.
pub fn build_request(
    topic: Option<&Topic>,
    platforms: &[String],
    options: &RequestOptions,
) -> Result<GenerationRequest, ValidationError> {
    let topic = topic.ok_or(ValidationError::MissingTopic)?;
    if platforms.is_empty() {
        return Err(ValidationError::NoPlatforms);
    }

    let mut targets: Vec<String> = Vec::with_capacity(platforms.len());
    for (idx, raw) in platforms.iter().enumerate() {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(ValidationError::BlankPlatform(idx));
        }
        if !targets.contains(&normalized) {
            targets.push(normalized);
        }
    }

    let site_url = options.brand.site_url.trim().trim_end_matches('/').to_string();
    let primary_url = options
        .primary_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}/topics/{}", site_url, url_slug(&topic.id)));

    Ok(GenerationRequest {
        topic_id: topic.id.clone(),
        topic_name: topic.title.clone(),
        topic_description: topic.description.clone(),
        audience: text_or(&options.audience, DEFAULT_AUDIENCE),
        tone: text_or(&options.tone, DEFAULT_TONE),
        locale: text_or(&options.locale, DEFAULT_LOCALE),
        primary_url,
        brand: BrandPayload {
            site_url,
            handles: options.brand.handles.clone(),
            utm_base: utm_base(&options.brand.utm_source, &topic.id),
        },
        target_platforms: targets,
        options: options.generation.clone(),
    })
}

/// Tracking query shared by every link generated for one topic.
pub fn utm_base(utm_source: &str, topic_id: &str) -> String {
    let source = utm_source.trim();
    let source = if source.is_empty() {
        DEFAULT_UTM_SOURCE
    } else {
        source
    };
    format!(
        "utm_source={}&utm_medium=social&utm_campaign=topic-{}",
        url_slug(source),
        url_slug(topic_id)
    )
}

fn url_slug(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

fn text_or(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
        .to_string()
}
