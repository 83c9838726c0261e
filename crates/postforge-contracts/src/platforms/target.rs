use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lowercases a platform name and folds its aliases (`x` is `twitter`).
/// The store, filters and the render registry all key on this form.
pub fn canonical_platform(raw: &str) -> String {
    let platform = raw.trim().to_ascii_lowercase();
    match platform.as_str() {
        "x" | "x-twitter" | "x_twitter" => "twitter".to_string(),
        _ => platform,
    }
}

pub fn canonical_format(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// A destination network plus content shape, written `platform:format`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformTarget {
    pub platform: String,
    pub format: String,
}

impl PlatformTarget {
    pub fn new(platform: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            format: format.into(),
        }
    }

    /// Splits an identifier such as `instagram:reel`. A bare platform name
    /// yields an empty format. Never fails; blank input gives blank parts.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.split_once(':') {
            Some((platform, format)) => {
                Self::new(canonical_platform(platform), canonical_format(format))
            }
            None => Self::new(canonical_platform(trimmed), ""),
        }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.platform, self.format)
    }

    pub fn matches(&self, platform: &str, format: &str) -> bool {
        canonical_platform(&self.platform) == canonical_platform(platform)
            && self.format.eq_ignore_ascii_case(format.trim())
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.format.is_empty() {
            write!(f, "{}", self.platform)
        } else {
            write!(f, "{}:{}", self.platform, self.format)
        }
    }
}

/// Filter-tab selection over stored results.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeFilter {
    #[default]
    All,
    Only(PlatformTarget),
}

impl TypeFilter {
    pub fn only(platform: &str, format: &str) -> Self {
        Self::Only(PlatformTarget::new(
            canonical_platform(platform),
            canonical_format(format),
        ))
    }

    pub fn accepts(&self, platform: &str, format: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(target) => target.matches(platform, format),
        }
    }
}

impl FromStr for TypeFilter {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        Ok(Self::Only(PlatformTarget::parse(trimmed)))
    }
}
