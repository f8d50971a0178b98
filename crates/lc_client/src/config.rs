//! Client configuration: built-in defaults overridden by environment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const ENV_API_URL: &str = "LC_API_URL";
pub const ENV_HUB_URL: &str = "LC_HUB_URL";
pub const ENV_DB_PATH: &str = "LC_DB_PATH";
pub const ENV_TIMEOUT_SECS: &str = "LC_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL routes are appended to, e.g. `https://host/api`.
    pub api_base_url: String,
    /// WebSocket endpoint of the push channel.
    pub hub_url: String,
    pub db_path: PathBuf,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://localhost:8443/api".into(),
            hub_url: "wss://localhost:8443/hub/app".into(),
            db_path: PathBuf::from("lattice-contact.db"),
            request_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_API_URL) {
            config.api_base_url = url;
        }
        if let Some(url) = lookup(ENV_HUB_URL) {
            config.hub_url = url;
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout_secs = secs,
                _ => tracing::warn!(value = %raw, "[config] ignoring invalid {ENV_TIMEOUT_SECS}"),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn overrides_apply_and_bad_timeout_is_ignored() {
        let env: HashMap<&str, &str> = [
            (ENV_API_URL, "https://api.example/api"),
            (ENV_DB_PATH, "/tmp/x.db"),
            (ENV_TIMEOUT_SECS, "soon"),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_base_url, "https://api.example/api");
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.hub_url, ClientConfig::default().hub_url);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"request_timeout_secs": 5}"#).unwrap();
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.db_path, PathBuf::from("lattice-contact.db"));
    }
}
