//! Connection admission: resolve an upgrade request to a lobby and a handle.
//!
//! Both steps may refuse. A refused connection is still upgraded, gets a
//! close-with-reason frame, and is then terminated, so the peer learns why.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, Uri};

use super::{HandleFields, Lobby, SessionManager};

/// What the resolvers get to see of the inbound upgrade.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    /// Lobby segment of the upgrade path (`<path>/<lobby>`).
    pub lobby: String,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Percent-decoded query parameters.
    pub query: HashMap<String, String>,
}

impl UpgradeRequest {
    pub fn new(
        lobby: impl Into<String>,
        uri: Uri,
        headers: HeaderMap,
        query: HashMap<String, String>,
    ) -> Self {
        Self {
            lobby: lobby.into(),
            uri,
            headers,
            query,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// Admission refusal; the reason is forwarded to the peer when present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Refused {
    pub reason: Option<String>,
}

impl Refused {
    pub fn because(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }

    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or("refused")
    }
}

#[async_trait]
pub trait Admission: Send + Sync {
    async fn resolve_lobby(
        &self,
        req: &UpgradeRequest,
        sessions: &SessionManager,
    ) -> Result<Arc<Lobby>, Refused>;

    async fn resolve_handle(
        &self,
        req: &UpgradeRequest,
        lobby: &Arc<Lobby>,
    ) -> Result<HandleFields, Refused>;
}

/// Default policy: the lobby must already be open; the handle is named by
/// the `name` query parameter.
#[derive(Debug, Default)]
pub struct OpenLobbies;

#[async_trait]
impl Admission for OpenLobbies {
    async fn resolve_lobby(
        &self,
        req: &UpgradeRequest,
        sessions: &SessionManager,
    ) -> Result<Arc<Lobby>, Refused> {
        sessions
            .get_lobby(&req.lobby)
            .ok_or_else(|| Refused::because(format!("unknown lobby {}", req.lobby)))
    }

    async fn resolve_handle(
        &self,
        req: &UpgradeRequest,
        _lobby: &Arc<Lobby>,
    ) -> Result<HandleFields, Refused> {
        match req.param("name") {
            Some("") => Err(Refused::because("empty name")),
            Some(name) => Ok(HandleFields::named(name)),
            None => Ok(HandleFields::named("guest")),
        }
    }
}
