use std::env;
use std::path::PathBuf;
use std::time::Duration;

use postforge_contracts::requests::{BrandConfig, DEFAULT_SITE_URL, DEFAULT_UTM_SOURCE};

pub const DEFAULT_API_BASE: &str = "http://localhost:8000/api";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

const MIN_POLL_INTERVAL_MS: u64 = 100;
const MAX_POLL_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_base: String,
    pub api_token: Option<String>,
    pub poll_interval: Duration,
    /// `None` watches a job until it reaches a terminal state, however long
    /// that takes.
    pub max_watch: Option<Duration>,
    pub http_timeout: Duration,
    pub events_path: Option<PathBuf>,
    pub brand: BrandConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_token: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_watch: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            events_path: None,
            brand: BrandConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    /// Same resolution as [`EngineConfig::from_env`] against an arbitrary
    /// key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let poll_interval_ms = lookup("POSTFORGE_POLL_INTERVAL_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        let max_watch = lookup("POSTFORGE_MAX_WATCH_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let http_timeout = lookup("POSTFORGE_HTTP_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);

        Self {
            api_base: lookup("POSTFORGE_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_token: lookup("POSTFORGE_API_TOKEN"),
            poll_interval: clamp_poll_interval(poll_interval_ms),
            max_watch,
            http_timeout: Duration::from_secs(http_timeout),
            events_path: lookup("POSTFORGE_EVENTS").map(PathBuf::from),
            brand: BrandConfig {
                site_url: lookup("POSTFORGE_SITE_URL")
                    .unwrap_or_else(|| DEFAULT_SITE_URL.to_string()),
                handles: lookup("POSTFORGE_HANDLES")
                    .map(|raw| BrandConfig::parse_handles(&raw))
                    .unwrap_or_default(),
                utm_source: lookup("POSTFORGE_UTM_SOURCE")
                    .unwrap_or_else(|| DEFAULT_UTM_SOURCE.to_string()),
            },
        }
    }

    pub fn with_poll_interval_ms(mut self, millis: u64) -> Self {
        self.poll_interval = clamp_poll_interval(millis);
        self
    }
}

pub fn clamp_poll_interval(millis: u64) -> Duration {
    Duration::from_millis(millis.clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
