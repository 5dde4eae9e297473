//! Lobby sync demo server.
//!
//! - WebSocket endpoint: `<server.path>/<lobby>?name=...`
//! - Every configured lobby keeps a `players` list (app 0) of the
//!   connected handles' names
//! - `echo` payloads are answered with their own data

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing_subscriber::{fmt, EnvFilter};

use lobbysync_core::error::SyncError;
use lobbysync_core::protocol::Payload;
use lobbysync_server::entities::SharedList;
use lobbysync_server::session::{Handle, Lobby, PayloadHandler, SessionManager};
use lobbysync_server::{app_state, config, router};

const PLAYERS_KEY: &str = "players";

struct Echo;

#[async_trait]
impl PayloadHandler for Echo {
    async fn on_payload(&self, payload: &Payload, lobby: &Arc<Lobby>, handle: &Arc<Handle>) -> Option<Value> {
        tracing::debug!(lobby = %lobby.key(), handle = %handle.id(), r#type = %payload.msg_type, "payload");
        (payload.msg_type == "echo").then(|| payload.data.clone())
    }
}

fn player_entry(handle: &Handle) -> Value {
    json!({ "id": handle.id().0, "name": handle.fields().name })
}

/// Attach a `players` list to every open lobby and keep it current.
fn track_players(sessions: &SessionManager) -> lobbysync_core::Result<()> {
    let players: Arc<DashMap<String, SharedList>> = Arc::new(DashMap::new());
    for lobby in sessions.lobbies() {
        let list = SharedList::new().with_key(PLAYERS_KEY)?;
        list.attach(&lobby, 0)?;
        players.insert(lobby.key().to_owned(), list);
    }

    let joined = Arc::clone(&players);
    sessions.on_handle_connected().add(move |(lobby, handle)| {
        if let Some(list) = joined.get(lobby.key()) {
            if let Err(e) = list.add(player_entry(handle)) {
                tracing::warn!(lobby = %lobby.key(), error = %e, "players add failed");
            }
        }
    });
    sessions.on_handle_disconnected().add(move |(lobby, handle)| {
        if let Some(list) = players.get(lobby.key()) {
            list.remove_value(&player_entry(handle));
        }
    });
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), SyncError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "lobbysync.yaml".into());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .server
        .listen
        .parse()
        .map_err(|e| SyncError::BadRequest(format!("server.listen must be a valid SocketAddr: {e}")))?;

    let state = app_state::AppState::new(cfg)?;
    state.sessions().add_handler(Arc::new(Echo));
    track_players(state.sessions())?;

    let app = router::build_router(state.clone());

    tracing::info!(%listen, "lobbysync-server starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| SyncError::Transport(format!("failed to bind: {e}")))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    state.sessions().dispose(Some("server shutting down"));
    served.map_err(|e| SyncError::Transport(format!("server failed: {e}")))
}
