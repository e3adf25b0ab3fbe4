//! API key resolution
//!
//! Tries multiple sources in order:
//! 1. The key from the config file
//! 2. Host-specific env var (e.g., `CONCORD_API_KEY_CONCORD_EXAMPLE_COM`)
//! 3. Generic `CONCORD_API_KEY`

use log::debug;

/// Resolves Concord API keys for different servers
#[derive(Debug, Clone, Default)]
pub struct ApiKeyResolver {
    /// Key from the config file, wins over everything else
    configured: Option<String>,
}

impl ApiKeyResolver {
    pub fn new(configured: Option<String>) -> Self {
        Self {
            configured: configured.filter(|k| !k.is_empty()),
        }
    }

    /// Get an API key for the given server URL from the process environment
    pub fn resolve(&self, server_url: &str) -> Option<String> {
        self.resolve_with(server_url, |key| std::env::var(key).ok())
    }

    /// Same as [`ApiKeyResolver::resolve`] with an explicit variable lookup
    pub fn resolve_with<F>(&self, server_url: &str, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = &self.configured {
            debug!("Using API key from config file");
            return Some(key.clone());
        }

        if let Some(env_key) = host_env_key(server_url) {
            if let Some(key) = lookup(&env_key).filter(|k| !k.is_empty()) {
                debug!("Using API key from env var {}", env_key);
                return Some(key);
            }
        }

        let key = lookup("CONCORD_API_KEY").filter(|k| !k.is_empty());
        if key.is_some() {
            debug!("Using API key from CONCORD_API_KEY");
        }
        key
    }
}

/// `https://concord.example.com` -> `CONCORD_API_KEY_CONCORD_EXAMPLE_COM`
fn host_env_key(server_url: &str) -> Option<String> {
    let url = reqwest::Url::parse(server_url).ok()?;
    let host = url.host_str()?;
    Some(format!(
        "CONCORD_API_KEY_{}",
        host.replace(['.', '-'], "_").to_uppercase()
    ))
}
