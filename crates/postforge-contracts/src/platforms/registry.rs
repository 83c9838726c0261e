use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use super::target::{canonical_format, canonical_platform, PlatformTarget};

/// Opaque name of a renderer contract. The renderer itself lives outside
/// this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderKey(&'static str);

impl RenderKey {
    pub const GENERIC: RenderKey = RenderKey("generic");

    pub fn as_str(&self) -> &'static str {
        self.0
    }

    pub fn is_generic(&self) -> bool {
        *self == Self::GENERIC
    }
}

impl fmt::Display for RenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSpec {
    pub target: PlatformTarget,
    pub key: RenderKey,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct PlatformRegistry {
    entries: IndexMap<(String, String), RenderSpec>,
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PlatformRegistry {
    pub fn new(entries: Option<IndexMap<(String, String), RenderSpec>>) -> Self {
        Self {
            entries: entries.unwrap_or_else(default_entries),
        }
    }

    /// Looks up the renderer contract for a pair. `None` means no dedicated
    /// renderer exists; callers fall back to [`RenderKey::GENERIC`].
    pub fn resolve(&self, platform: &str, format: &str) -> Option<RenderKey> {
        self.entries
            .get(&lookup_key(platform, format))
            .map(|spec| spec.key)
    }

    pub fn resolve_or_fallback(&self, platform: &str, format: &str) -> RenderKey {
        self.resolve(platform, format).unwrap_or(RenderKey::GENERIC)
    }

    pub fn get(&self, platform: &str, format: &str) -> Option<&RenderSpec> {
        self.entries.get(&lookup_key(platform, format))
    }

    pub fn pairs(&self) -> impl Iterator<Item = &RenderSpec> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn lookup_key(platform: &str, format: &str) -> (String, String) {
    (canonical_platform(platform), canonical_format(format))
}

fn default_entries() -> IndexMap<(String, String), RenderSpec> {
    let mut map = IndexMap::new();

    let mut insert = |platform: &str, format: &str, key: &'static str, label: &str| {
        map.insert(
            (platform.to_string(), format.to_string()),
            RenderSpec {
                target: PlatformTarget::new(platform, format),
                key: RenderKey(key),
                label: label.to_string(),
            },
        );
    };

    insert("instagram", "post", "instagram.post", "Instagram Post");
    insert("instagram", "carousel", "instagram.carousel", "Instagram Carousel");
    insert("instagram", "reel", "instagram.reel", "Instagram Reel");
    insert("instagram", "story", "instagram.story", "Instagram Story");
    insert("linkedin", "post", "linkedin.post", "LinkedIn Post");
    insert("linkedin", "article", "linkedin.article", "LinkedIn Article");
    insert("linkedin", "carousel", "linkedin.carousel", "LinkedIn Carousel");
    insert("twitter", "tweet", "twitter.tweet", "X Post");
    insert("twitter", "thread", "twitter.thread", "X Thread");
    insert("youtube", "short", "youtube.short", "YouTube Short");
    insert("youtube", "video", "youtube.video", "YouTube Video Script");
    insert("youtube", "community", "youtube.community", "YouTube Community Post");
    insert("medium", "article", "medium.article", "Medium Article");
    insert("reddit", "post", "reddit.post", "Reddit Post");
    insert("ghost", "article", "ghost.article", "Ghost Article");
    insert("devto", "article", "devto.article", "DEV Article");
    insert("hashnode", "article", "hashnode.article", "Hashnode Article");
    insert("substack", "newsletter", "substack.newsletter", "Substack Newsletter");
    insert("facebook", "post", "facebook.post", "Facebook Post");
    insert("threads", "post", "threads.post", "Threads Post");
    insert("tiktok", "script", "tiktok.script", "TikTok Script");

    map
}

/// One labelled line printed by the generic renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericField {
    pub label: &'static str,
    pub text: String,
}

const GENERIC_FIELD_NAMES: &[&str] = &["title", "caption", "content", "hashtags"];

/// Pulls the handful of fields the generic renderer knows how to show.
/// Missing or empty fields are skipped.
pub fn generic_fields(content: &Value) -> Vec<GenericField> {
    let Some(obj) = content.as_object() else {
        return match content {
            Value::String(text) if !text.trim().is_empty() => vec![GenericField {
                label: "content",
                text: text.clone(),
            }],
            _ => Vec::new(),
        };
    };

    let mut fields = Vec::new();
    for label in GENERIC_FIELD_NAMES.iter().copied() {
        let Some(value) = obj.get(label) else {
            continue;
        };
        let text = if label == "hashtags" {
            hashtags_text(value)
        } else {
            field_text(value)
        };
        if let Some(text) = text.filter(|text| !text.trim().is_empty()) {
            fields.push(GenericField { label, text });
        }
    }
    fields
}

fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Array(rows) => {
            let parts = rows.iter().filter_map(field_text).collect::<Vec<String>>();
            Some(parts.join("\n"))
        }
        other => serde_json::to_string_pretty(other).ok(),
    }
}

fn hashtags_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(rows) => {
            let tags = rows
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(|tag| {
                    if tag.starts_with('#') {
                        tag.to_string()
                    } else {
                        format!("#{tag}")
                    }
                })
                .collect::<Vec<String>>();
            Some(tags.join(" "))
        }
        _ => None,
    }
}
