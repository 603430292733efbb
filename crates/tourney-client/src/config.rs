//! Client configuration.
//!
//! Loaded from `tourney-client.toml` in the working directory or
//! `~/.config/tourney/`, with `TOURNEY_SERVER` and `TOURNEY_USER` environment
//! overrides for the defaults. Command line flags override both.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tourney_core::{AdminPolicy, SyncConfig};
use tourney_transport::SessionConfig;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server base URL.
    #[serde(default = "default_server")]
    pub server: String,

    /// User id sent in the auth frame.
    #[serde(default = "default_user")]
    pub user: Option<String>,

    /// Local admin allow-list, consulted only when the server does not
    /// acknowledge the session in time.
    #[serde(default)]
    pub admins: AdminPolicy,

    /// Realtime session settings.
    #[serde(default)]
    pub session: SessionSection,

    /// Snapshot synchronization settings.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// `[session]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Explicit realtime endpoint; derived from `server` when absent.
    #[serde(default)]
    pub url: Option<String>,

    /// Backoff base in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// How long to wait for the server's `authenticated` reply.
    #[serde(default = "default_auth_wait_ms")]
    pub auth_wait_ms: u64,
}

fn default_server() -> String {
    std::env::var("TOURNEY_SERVER").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string())
}

fn default_user() -> Option<String> {
    std::env::var("TOURNEY_USER").ok()
}

fn default_base_delay_ms() -> u64 {
    SessionConfig::default().base_delay_ms
}

fn default_max_delay_ms() -> u64 {
    SessionConfig::default().max_delay_ms
}

fn default_auth_wait_ms() -> u64 {
    5_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            user: default_user(),
            admins: AdminPolicy::default(),
            session: SessionSection::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            url: None,
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            auth_wait_ms: default_auth_wait_ms(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `path`, or from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let config_paths = [
            "tourney-client.toml",
            "~/.config/tourney/tourney-client.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Realtime endpoint: the explicit `[session] url`, or `server` with its
    /// scheme switched to `ws`/`wss` and `/ws` appended.
    #[must_use]
    pub fn websocket_url(&self) -> String {
        if let Some(url) = &self.session.url {
            return url.clone();
        }

        let base = self.server.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/ws")
    }

    /// Settings for the realtime session.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            url: self.websocket_url(),
            base_delay_ms: self.session.base_delay_ms,
            max_delay_ms: self.session.max_delay_ms,
        }
    }

    /// Deadline for the server's `authenticated` reply.
    #[must_use]
    pub fn auth_wait(&self) -> Duration {
        Duration::from_millis(self.session.auth_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourney_protocol::BracketSize;

    #[test]
    fn test_websocket_url_derivation() {
        let mut config = ClientConfig {
            server: "http://localhost:8080/".into(),
            ..ClientConfig::default()
        };
        assert_eq!(config.websocket_url(), "ws://localhost:8080/ws");

        config.server = "https://tourney.example".into();
        assert_eq!(config.websocket_url(), "wss://tourney.example/ws");

        config.session.url = Some("ws://elsewhere/live".into());
        assert_eq!(config.session_config().url, "ws://elsewhere/live");
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            server = "http://10.0.0.5:9000"
            user = "alice-id"
            admins = ["alice-id"]

            [session]
            base_delay_ms = 250

            [sync]
            debounce_ms = 500
            default_size = 16
        "#;

        let config: ClientConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.user.as_deref(), Some("alice-id"));
        assert!(config.admins.is_admin("alice-id"));
        assert_eq!(config.session.base_delay_ms, 250);
        assert_eq!(config.session.max_delay_ms, 30_000);
        assert_eq!(config.sync.debounce_ms, 500);
        assert_eq!(config.sync.poll_interval_ms, 3_000);
        assert_eq!(config.sync.default_size, BracketSize::Sixteen);
        assert_eq!(config.websocket_url(), "ws://10.0.0.5:9000/ws");
    }
}
