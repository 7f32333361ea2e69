//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::path::PathBuf;

/// Default maximum HTTP calls per second
pub const DEFAULT_RATE_LIMIT: f64 = 5.0;
/// Default maximum attempts per request
pub const DEFAULT_RETRIES: u32 = 5;
/// Default initial backoff in seconds, doubled per retry
pub const DEFAULT_BACKOFF: f64 = 0.5;
/// Default cache expiry: one day
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;

/// rivapi configuration with layered hierarchy
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum HTTP calls per second across all sources
    pub rate_limit: Option<f64>,

    /// Maximum attempts per request
    pub retries: Option<u32>,

    /// Initial retry backoff in seconds (doubled per attempt)
    pub backoff: Option<f64>,

    /// User-Agent header override
    pub user_agent: Option<String>,

    /// Cached responses older than this many seconds are refetched
    pub cache_ttl_secs: Option<u64>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (applied by the accessors)

        // 2. Global user config (~/.config/rivapi/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                if let Ok(contents) = std::fs::read_to_string(&global_path) {
                    if let Ok(global) = serde_yml::from_str::<Config>(&contents) {
                        config.merge(global);
                    }
                }
            }
        }

        // 3. Environment variables
        if let Some(v) = env_parse::<f64>("RIVAPI_RATE_LIMIT") {
            config.rate_limit = Some(v);
        }
        if let Some(v) = env_parse::<u32>("RIVAPI_RETRIES") {
            config.retries = Some(v);
        }
        if let Some(v) = env_parse::<f64>("RIVAPI_BACKOFF") {
            config.backoff = Some(v);
        }
        if let Ok(v) = std::env::var("RIVAPI_USER_AGENT") {
            config.user_agent = Some(v);
        }
        if let Some(v) = env_parse::<u64>("RIVAPI_CACHE_TTL") {
            config.cache_ttl_secs = Some(v);
        }

        config
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rivapi")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.rate_limit.is_some() {
            self.rate_limit = other.rate_limit;
        }
        if other.retries.is_some() {
            self.retries = other.retries;
        }
        if other.backoff.is_some() {
            self.backoff = other.backoff;
        }
        if other.user_agent.is_some() {
            self.user_agent = other.user_agent;
        }
        if other.cache_ttl_secs.is_some() {
            self.cache_ttl_secs = other.cache_ttl_secs;
        }
    }

    pub fn rate_limit(&self) -> f64 {
        let limit = self.rate_limit.unwrap_or(DEFAULT_RATE_LIMIT);
        if limit > 0.0 {
            limit
        } else {
            DEFAULT_RATE_LIMIT
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries.unwrap_or(DEFAULT_RETRIES).max(1)
    }

    pub fn backoff(&self) -> f64 {
        self.backoff.unwrap_or(DEFAULT_BACKOFF)
    }

    pub fn cache_ttl_secs(&self) -> u64 {
        self.cache_ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("rivapi/{}", env!("CARGO_PKG_VERSION")))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
