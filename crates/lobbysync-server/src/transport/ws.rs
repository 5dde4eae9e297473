//! WebSocket handler.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS on `<path>/<lobby>`
//! - Run admission (lobby, then handle fields); refused peers get a
//!   close-with-reason frame before the socket is closed
//! - Lifecycle: keepalive frames, ws ping/pong, release on exit
//! - Decode-once, then hand frames to the session manager

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderMap, Uri},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use lobbysync_core::protocol::payload::{close_frame, keepalive_frame};

use crate::app_state::AppState;
use crate::session::{Admitted, Lobby, Outbound, Refused, UpgradeRequest};
use crate::transport::codec::{decode, Inbound};

// --------------------
// Entry
// --------------------
pub async fn ws_upgrade(
    State(app): State<AppState>,
    Path(lobby): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    uri: Uri,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let req = UpgradeRequest::new(lobby, uri, headers, query);
    ws.on_upgrade(move |socket| async move {
        match admit(&app, &req).await {
            Ok((lobby, admitted)) => {
                let span = tracing::info_span!(
                    "session",
                    lobby = %lobby.key(),
                    handle = %admitted.handle.id()
                );
                run_session(app, lobby, admitted, socket)
                    .instrument(span)
                    .await;
            }
            Err(refused) => {
                tracing::info!(lobby = %req.lobby, reason = %refused.reason(), "connection refused");
                refuse(socket, &refused).await;
            }
        }
    })
}

async fn admit(app: &AppState, req: &UpgradeRequest) -> Result<(Arc<Lobby>, Admitted), Refused> {
    let admission = app.admission();
    let lobby = admission.resolve_lobby(req, app.sessions()).await?;
    let fields = admission.resolve_handle(req, &lobby).await?;
    let admitted = app.sessions().admit(&lobby, fields);
    Ok((lobby, admitted))
}

async fn refuse(mut socket: WebSocket, refused: &Refused) {
    let _ = socket
        .send(Message::Text(close_frame(refused.reason.as_deref())))
        .await;
    let _ = socket.send(Message::Close(None)).await;
}

// --------------------
// Core session loop
// --------------------
async fn run_session(app: AppState, lobby: Arc<Lobby>, admitted: Admitted, socket: WebSocket) {
    let Admitted {
        handle,
        mut outbound,
    } = admitted;
    let sessions = app.sessions().clone();

    let (mut ws_tx, mut ws_rx) = socket.split();

    let ping_every = sessions.settings().ping_interval;
    let mut ping_tick = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
    ping_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // outbound writer
            maybe_out = outbound.recv() => {
                match maybe_out {
                    Some(Outbound::Text(text)) => {
                        if ws_tx.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close(reason)) => {
                        tracing::debug!(reason = reason.as_deref().unwrap_or(""), "closing by request");
                        let _ = ws_tx.send(Message::Text(close_frame(reason.as_deref()))).await;
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                    None => break,
                }
            }

            // inbound reader
            incoming = ws_rx.next() => {
                let Some(Ok(msg)) = incoming else { break; };
                match decode(msg) {
                    Ok(Inbound::Frame(frame)) => sessions.handle_frame(&lobby, &handle, frame).await,
                    Ok(Inbound::Ping(payload)) => {
                        if ws_tx.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Inbound::Pong) => {}
                    Ok(Inbound::Close) => break,
                    Err(e) => {
                        tracing::debug!(error = %e, "inbound frame dropped");
                    }
                }
            }

            // keepalive
            _ = ping_tick.tick() => {
                if ws_tx.send(Message::Text(keepalive_frame())).await.is_err() {
                    break;
                }
            }
        }
    }

    sessions.release(&lobby, &handle);
}
