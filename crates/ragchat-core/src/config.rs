//! Client configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::demo::DemoPacing;
use crate::error::ConfigError;
use crate::scroll::ScrollPolicy;
use crate::splitter::Delimiters;

/// Configuration for the chat client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatConfig {
    /// Base URL of the assistant service.
    #[serde(default = "ChatConfig::default_server_url")]
    pub server_url: String,

    /// Restrict answers to one top-level category.
    #[serde(default)]
    pub category_filter: Option<String>,

    /// Reranker requested from the service; `null` leaves the choice to it.
    #[serde(default = "ChatConfig::default_reranker_type")]
    pub reranker_type: Option<String>,

    /// Inline reasoning delimiters.
    #[serde(default)]
    pub delimiters: Delimiters,

    /// Scroll-follow thresholds and timings.
    #[serde(default)]
    pub scroll: ScrollPolicy,

    /// Seconds between health probes.
    #[serde(default = "ChatConfig::default_health_interval")]
    pub health_interval_seconds: u64,

    /// Connect timeout for chat and health requests, in seconds.
    #[serde(default = "ChatConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Play an offline demo reply when the stream cannot be opened.
    #[serde(default)]
    pub demo_fallback: bool,

    /// Pacing of the offline demo reply.
    #[serde(default)]
    pub demo: DemoPacing,
}

impl ChatConfig {
    fn default_server_url() -> String {
        "http://localhost:8000".to_string()
    }

    #[allow(clippy::unnecessary_wraps)]
    fn default_reranker_type() -> Option<String> {
        Some("qwen3".to_string())
    }

    const fn default_health_interval() -> u64 {
        30
    }

    const fn default_connect_timeout() -> u64 {
        10
    }

    /// Read and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, does not parse, or
    /// holds an out-of-range value.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(invalid("server_url", "must not be empty"));
        }
        if self.delimiters.open.is_empty() || self.delimiters.close.is_empty() {
            return Err(invalid("delimiters", "tokens must not be empty"));
        }
        if self.delimiters.open == self.delimiters.close {
            return Err(invalid("delimiters", "open and close tokens must differ"));
        }
        if self.health_interval_seconds == 0 {
            return Err(invalid("health_interval_seconds", "must be at least 1"));
        }
        if self.scroll.throttle_ms == 0 {
            return Err(invalid("scroll.throttle_ms", "must be at least 1"));
        }
        Ok(())
    }

    /// Health probe interval.
    #[must_use]
    pub const fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_seconds)
    }

    /// Connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            server_url: Self::default_server_url(),
            category_filter: None,
            reranker_type: Self::default_reranker_type(),
            delimiters: Delimiters::default(),
            scroll: ScrollPolicy::default(),
            health_interval_seconds: Self::default_health_interval(),
            connect_timeout_seconds: Self::default_connect_timeout(),
            demo_fallback: false,
            demo: DemoPacing::default(),
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
