//! Filter configuration.
//!
//! Defaults match the production widget. Values can be overridden from
//! `AMOCALLS_*` environment variables or from a JSON document in which every
//! field is optional.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::error::ConfigError;

/// Cache TTL - 5 minutes
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_POLL_MAX_ITERATIONS: u32 = 100;
pub const DEFAULT_API_BASE_URL: &str = "https://amo-calls.stream-press.ru";

const ENV_PREFIX: &str = "AMOCALLS_";

/// Class names of the host CRM markup and of the injected decoration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub call_entry: String,
    pub direction_out: String,
    pub header: String,
    pub status: String,
    pub operator: String,
    pub player_link: String,
    pub date: String,
    pub duration: String,
    pub feed_container: String,
    pub placeholder: String,
    pub placeholder_button: String,
    pub hide_button: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            call_entry: "feed-note-wrapper-call_in_out".to_string(),
            direction_out: "feed-note__icon-direction_out".to_string(),
            header: "feed-note__header-inner-nowrap".to_string(),
            status: "feed-note__call-status".to_string(),
            operator: "feed-note__amojo-user".to_string(),
            player_link: "feed-note__call-player".to_string(),
            date: "js-feed-note__date".to_string(),
            duration: "feed-note__call-duration".to_string(),
            feed_container: "feed__timeline".to_string(),
            placeholder: "call-hidden-placeholder".to_string(),
            placeholder_button: "call-hidden-placeholder__button".to_string(),
            hide_button: "hidden-call-hide-btn".to_string(),
        }
    }
}

/// User-facing texts of the injected decoration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Labels {
    pub placeholder: String,
    pub show_button: String,
    pub hide_button: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            placeholder: "Звонок по другой сделке".to_string(),
            show_button: "Показать звонок".to_string(),
            hide_button: "Скрыть звонок".to_string(),
        }
    }
}

/// Configuration of the call visibility filter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub api_base_url: String,
    pub auth_token: Option<String>,
    pub request_timeout_ms: u64,
    pub cache_ttl_secs: u64,
    pub debounce_ms: u64,
    pub context_poll_interval_ms: u64,
    pub context_poll_max_iterations: u32,
    pub selectors: Selectors,
    pub labels: Labels,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            auth_token: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            context_poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            context_poll_max_iterations: DEFAULT_POLL_MAX_ITERATIONS,
            selectors: Selectors::default(),
            labels: Labels::default(),
        }
    }
}

impl FilterConfig {
    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: FilterConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Defaults overlaid with `AMOCALLS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut config = Self::default();

        if let Some(url) = get("API_BASE_URL") {
            config.api_base_url = url;
        }
        if let Some(token) = get("AUTH_TOKEN") {
            config.auth_token = Some(token);
        }
        if let Some(v) = get("REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = parse_number("REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("CACHE_TTL_SECS") {
            config.cache_ttl_secs = parse_number("CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = get("DEBOUNCE_MS") {
            config.debounce_ms = parse_number("DEBOUNCE_MS", &v)?;
        }
        if let Some(v) = get("CONTEXT_POLL_INTERVAL_MS") {
            config.context_poll_interval_ms = parse_number("CONTEXT_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("CONTEXT_POLL_MAX_ITERATIONS") {
            config.context_poll_max_iterations =
                parse_number("CONTEXT_POLL_MAX_ITERATIONS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_base_url is empty".to_string()));
        }
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache_ttl_secs must be positive".to_string()));
        }
        if self.debounce_ms == 0 {
            return Err(ConfigError::Invalid("debounce_ms must be positive".to_string()));
        }
        if self.context_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "context_poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn context_poll_interval(&self) -> Duration {
        Duration::from_millis(self.context_poll_interval_ms)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| {
        ConfigError::Invalid(format!("{}{} is not a valid number: {:?}", ENV_PREFIX, name, raw))
    })
}
