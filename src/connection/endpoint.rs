//! Socket endpoint configuration.

use serde::{Deserialize, Serialize};

/// Default socket path appended to the base URL.
pub const DEFAULT_SOCKET_PATH: &str = "/socket";

/// Where the chat socket lives. Without a base URL no connection is ever
/// attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Scheme, host and port, e.g. `https://chat.example.org:8443`.
    pub base_url: Option<String>,
    /// Path of the socket endpoint. Defaults to [`DEFAULT_SOCKET_PATH`].
    pub path: Option<String>,
}

impl EndpointConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn is_configured(&self) -> bool {
        self.base_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }

    /// Full WebSocket URL, mapping `http(s)` to `ws(s)`.
    pub fn socket_url(&self) -> Option<String> {
        let base = self.base_url.as_deref()?.trim();
        if base.is_empty() {
            return None;
        }

        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            format!("ws://{base}")
        };

        let path = self
            .path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_SOCKET_PATH);

        Some(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }
}
