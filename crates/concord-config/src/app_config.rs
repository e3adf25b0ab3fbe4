//! Application configuration
//!
//! Configuration loaded from .concord-console.toml, then overridden by
//! `CONCORD_SERVER_URL` when it is set. API keys found in the environment are
//! resolved per host by `concord-client`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration loaded from .concord-console.toml
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Base URL of the Concord server (e.g., "https://concord.example.com")
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// API key sent as the `Authorization` header
    #[serde(default)]
    pub api_key: Option<String>,

    /// Raw `Cookie` header value (e.g., "JSESSIONID=..."), for setups that rely on console sessions
    #[serde(default)]
    pub session_cookie: Option<String>,

    /// Delay between two log polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for one log round trip (status + chunk)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Size of the initial tail view, in bytes
    #[serde(default = "default_tail_bytes")]
    pub tail_bytes: u64,

    /// Minimum spacing between two API calls, 0 disables throttling
    #[serde(default)]
    pub throttle_ms: u64,
}

fn default_server_url() -> String {
    crate::DEFAULT_SERVER_URL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_tail_bytes() -> u64 {
    2048
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            api_key: None,
            session_cookie: None,
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            tail_bytes: default_tail_bytes(),
            throttle_ms: 0,
        }
    }
}

impl AppConfig {
    /// Load config from the first config file found, or use defaults,
    /// then apply environment overrides
    pub fn load() -> Self {
        let mut config = Self::from_file_or_default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    fn from_file_or_default() -> Self {
        if let Some(content) = crate::load_config_file() {
            match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded app config from file");
                    return config;
                }
                Err(e) => {
                    log::warn!("Failed to parse config file: {}", e);
                }
            }
        }

        log::debug!("Using default app config");
        Self::default()
    }

    /// Override file values with environment values
    ///
    /// `lookup` resolves a variable name; it is a parameter so tests do not
    /// have to mutate the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CONCORD_SERVER_URL").filter(|v| !v.is_empty()) {
            log::debug!("Server URL overridden by CONCORD_SERVER_URL");
            self.server_url = url;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn throttle_window(&self) -> Option<Duration> {
        (self.throttle_ms > 0).then(|| Duration::from_millis(self.throttle_ms))
    }
}
