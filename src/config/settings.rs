//! Client configuration file handling.
//!
//! Loads [`ClientConfig`] from `config.json` in the XDG config directory,
//! then applies environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::xdg::XdgDirs;
use crate::animation::AnimationConfig;
use crate::connection::{EndpointConfig, ReconnectPolicy};

/// Overrides `endpoint.base_url`.
pub const ENV_SERVER_URL: &str = "CONFCHAT_SERVER_URL";

/// Overrides `endpoint.path`.
pub const ENV_SOCKET_PATH: &str = "CONFCHAT_SOCKET_PATH";

/// Error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: EndpointConfig,
    pub animation: AnimationConfig,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Load from the default path, falling back to defaults when the file
    /// does not exist, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_config_path();
        let mut config = match Self::load_from_path(&path) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => {
                debug!(path = %path.display(), "No config file, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a specific path.
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply `CONFCHAT_*` environment overrides. Empty values are ignored.
    pub fn apply_env(&mut self) {
        if let Some(url) = env_value(ENV_SERVER_URL) {
            self.endpoint.base_url = Some(url);
        }
        if let Some(path) = env_value(ENV_SOCKET_PATH) {
            self.endpoint.path = Some(path);
        }
    }

    /// `$XDG_CONFIG_HOME/confchat/config.json`.
    pub fn default_config_path() -> PathBuf {
        XdgDirs::new().config.join("config.json")
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(
            &path,
            r#"{"endpoint": {"base_url": "https://chat.example.org"}, "animation": {"interval_ms": 16}}"#,
        )
        .unwrap();

        let config = ClientConfig::load_from_path(&path).unwrap();
        assert_eq!(
            config.endpoint.base_url.as_deref(),
            Some("https://chat.example.org")
        );
        assert_eq!(config.animation.interval_ms, 16);
        assert_eq!(config.animation.max_chars_per_interval, 30);
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let result = ClientConfig::load_from_path(&temp.path().join("nope.json"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ClientConfig::load_from_path(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.json");
        let config = ClientConfig {
            endpoint: EndpointConfig::new("http://localhost:3001").with_path("/chat"),
            ..Default::default()
        };
        config.save_to_path(&path).unwrap();
        assert_eq!(ClientConfig::load_from_path(&path).unwrap(), config);
    }

    #[test]
    #[serial]
    fn test_env_overrides_endpoint() {
        std::env::set_var(ENV_SERVER_URL, "http://override:9000");
        std::env::set_var(ENV_SOCKET_PATH, "  ");

        let mut config = ClientConfig {
            endpoint: EndpointConfig::new("http://file").with_path("/from-file"),
            ..Default::default()
        };
        config.apply_env();

        std::env::remove_var(ENV_SERVER_URL);
        std::env::remove_var(ENV_SOCKET_PATH);

        assert_eq!(config.endpoint.base_url.as_deref(), Some("http://override:9000"));
        assert_eq!(config.endpoint.path.as_deref(), Some("/from-file"));
    }

    #[test]
    #[serial]
    fn test_default_path_respects_xdg() {
        let temp = TempDir::new().unwrap();
        std::env::set_var("XDG_CONFIG_HOME", temp.path());
        let path = ClientConfig::default_config_path();
        std::env::remove_var("XDG_CONFIG_HOME");

        assert_eq!(path, temp.path().join("confchat").join("config.json"));
    }
}
