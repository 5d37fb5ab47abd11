//! Client configuration.
//!
//! Every field has a default, so a partial JSON document (or none at all)
//! is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::state::game::DEFAULT_LANGUAGE;

/// Development server endpoint.
pub const DEVELOPMENT_WS_URL: &str = "ws://localhost:8000/ws";

/// Production server endpoint.
pub const PRODUCTION_WS_URL: &str = "wss://shibacoder-production.up.railway.app/ws";

/// Environment variable selecting `production` or development defaults.
pub const ENV_VAR_ENV: &str = "SHIBACODER_ENV";

/// Environment variable overriding the websocket URL.
pub const ENV_VAR_WS_URL: &str = "SHIBACODER_WS_URL";

/// Reconnect backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Give up after this many consecutive failures (`None` = never)
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub ws_url: String,
    pub backoff: BackoffConfig,
    /// Keep-alive ping period
    pub ping_interval_ms: u64,
    /// How long a test result stays visible before it is cleared
    pub results_display_ms: u64,
    /// Language sent with submissions when the caller doesn't pick one
    pub default_language: String,
    /// Where the last player name is persisted
    pub prefs_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl ClientConfig {
    pub fn development() -> Self {
        Self {
            ws_url: DEVELOPMENT_WS_URL.to_string(),
            backoff: BackoffConfig::default(),
            ping_interval_ms: 5_000,
            results_display_ms: 5_000,
            default_language: DEFAULT_LANGUAGE.to_string(),
            prefs_path: None,
        }
    }

    pub fn production() -> Self {
        Self {
            ws_url: PRODUCTION_WS_URL.to_string(),
            ..Self::development()
        }
    }

    /// Parse a (possibly partial) JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from `SHIBACODER_ENV` and `SHIBACODER_WS_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(ENV_VAR_ENV).as_deref() {
            Some("production") => Self::production(),
            _ => Self::development(),
        };
        if let Some(url) = lookup(ENV_VAR_WS_URL).filter(|u| !u.trim().is_empty()) {
            config.ws_url = url.trim().to_string();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://") {
            Ok(())
        } else {
            Err(ConfigError::InvalidUrl(self.ws_url.clone()))
        }
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn results_display(&self) -> Duration {
        Duration::from_millis(self.results_display_ms)
    }
}
