use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use lobbysync_core::error::{Result, SyncError};

use crate::session::SessionSettings;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    /// Lobbies opened at boot.
    #[serde(default)]
    pub lobbies: Vec<LobbyConfig>,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(SyncError::UnsupportedVersion);
        }

        self.server.validate()?;

        let mut seen = HashSet::new();
        for lobby in &self.lobbies {
            if lobby.key.is_empty() {
                return Err(SyncError::BadRequest("lobbies[].key must not be empty".into()));
            }
            if !seen.insert(lobby.key.as_str()) {
                return Err(SyncError::BadRequest(format!(
                    "duplicate lobby key: {}",
                    lobby.key
                )));
            }
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            ping_interval: Duration::from_millis(self.server.ping_interval_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Upgrade route prefix; peers connect to `<path>/<lobby>`.
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            ping_interval_ms: default_ping_interval_ms(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') || self.path.ends_with('/') {
            return Err(SyncError::BadRequest(
                "server.path must start with '/' and not end with '/'".into(),
            ));
        }
        if !(100..=120000).contains(&self.ping_interval_ms) {
            return Err(SyncError::BadRequest(
                "server.ping_interval_ms must be between 100 and 120000".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_path() -> String {
    "/ws".into()
}
fn default_ping_interval_ms() -> u64 {
    10000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LobbyConfig {
    pub key: String,
}
