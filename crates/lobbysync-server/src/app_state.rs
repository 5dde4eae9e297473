//! Shared application state for the lobby server.
//!
//! Holds the validated config, the session manager (with the configured
//! lobbies already open) and the admission policy used on upgrade.

use std::sync::Arc;

use lobbysync_core::error::{Result, SyncError};

use crate::config::ServerConfig;
use crate::session::{Admission, OpenLobbies, SessionManager};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: ServerConfig,
    sessions: SessionManager,
    admission: Arc<dyn Admission>,
}

impl AppState {
    /// Build application state with the default admission policy.
    pub fn new(cfg: ServerConfig) -> Result<Self> {
        Self::with_admission(cfg, Arc::new(OpenLobbies))
    }

    pub fn with_admission(cfg: ServerConfig, admission: Arc<dyn Admission>) -> Result<Self> {
        let sessions = SessionManager::new(cfg.session_settings());
        for lobby in &cfg.lobbies {
            if sessions.open_lobby(&lobby.key).is_none() {
                return Err(SyncError::KeyConflict(lobby.key.clone()));
            }
        }

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                sessions,
                admission,
            }),
        })
    }

    pub fn cfg(&self) -> &ServerConfig {
        &self.inner.cfg
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    pub fn admission(&self) -> &Arc<dyn Admission> {
        &self.inner.admission
    }
}
