//! Session manager: lobbies, handles, inbound handling and broadcast.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

use lobbysync_core::emitter::Emitter;
use lobbysync_core::error::Result;
use lobbysync_core::guard::{read, write};
use lobbysync_core::protocol::payload::SYNC_OK;
use lobbysync_core::protocol::{Frame, Payload};

use super::{Handle, HandleFields, HandleId, Lobby, Outbound, PayloadHandler};

/// `(lobby, handle)` carried by connect/disconnect notifications.
pub type HandleEvent = (Arc<Lobby>, Arc<Handle>);

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Period of the keepalive frame sent to every handle.
    pub ping_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
        }
    }
}

/// A freshly admitted handle and the queue its connection task drains.
pub struct Admitted {
    pub handle: Arc<Handle>,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    settings: SessionSettings,
    lobbies: DashMap<String, Arc<Lobby>>,
    next_handle: AtomicU64,
    handlers: RwLock<Vec<Arc<dyn PayloadHandler>>>,
    on_handle_connected: Emitter<HandleEvent>,
    on_handle_disconnected: Emitter<HandleEvent>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}

impl SessionManager {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                lobbies: DashMap::new(),
                next_handle: AtomicU64::new(1),
                handlers: RwLock::new(Vec::new()),
                on_handle_connected: Emitter::new(),
                on_handle_disconnected: Emitter::new(),
            }),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    // ---- lobbies

    /// Create and register a lobby; `None` if the key is taken.
    pub fn open_lobby(&self, key: &str) -> Option<Arc<Lobby>> {
        use dashmap::mapref::entry::Entry;
        match self.inner.lobbies.entry(key.to_owned()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let lobby = Lobby::new(key);
                slot.insert(Arc::clone(&lobby));
                tracing::info!(lobby = %key, "lobby opened");
                Some(lobby)
            }
        }
    }

    pub fn get_lobby(&self, key: &str) -> Option<Arc<Lobby>> {
        self.inner.lobbies.get(key).map(|l| Arc::clone(l.value()))
    }

    pub fn lobbies(&self) -> Vec<Arc<Lobby>> {
        self.inner.lobbies.iter().map(|l| Arc::clone(l.value())).collect()
    }

    /// Disconnect every handle, dispose every root entity, deregister.
    /// Returns false for unknown (or already closed) lobbies.
    pub fn close_lobby(&self, key: &str, reason: Option<&str>) -> bool {
        let Some((_, lobby)) = self.inner.lobbies.remove(key) else {
            return false;
        };
        for handle in lobby.handles() {
            handle.disconnect(reason);
        }
        let roots = lobby.registry().roots();
        for entity in roots {
            entity.dispose();
        }
        tracing::info!(lobby = %key, reason = reason.unwrap_or(""), "lobby closed");
        true
    }

    /// Close every lobby.
    pub fn dispose(&self, reason: Option<&str>) {
        let keys: Vec<String> = self.inner.lobbies.iter().map(|l| l.key().clone()).collect();
        for key in keys {
            self.close_lobby(&key, reason);
        }
    }

    // ---- handles

    pub fn on_handle_connected(&self) -> &Emitter<HandleEvent> {
        &self.inner.on_handle_connected
    }

    pub fn on_handle_disconnected(&self) -> &Emitter<HandleEvent> {
        &self.inner.on_handle_disconnected
    }

    /// Register a new handle in `lobby` and notify listeners.
    pub fn admit(&self, lobby: &Arc<Lobby>, fields: HandleFields) -> Admitted {
        let id = HandleId(self.inner.next_handle.fetch_add(1, Ordering::Relaxed));
        let (handle, outbound) = Handle::new(id, fields);
        lobby.add_handle(Arc::clone(&handle));
        tracing::info!(lobby = %lobby.key(), handle = %id, name = %handle.fields().name, "handle connected");
        self.inner
            .on_handle_connected
            .dispatch(&(Arc::clone(lobby), Arc::clone(&handle)));
        Admitted { handle, outbound }
    }

    /// Remove a handle whose connection ended. Notifies at most once.
    pub fn release(&self, lobby: &Arc<Lobby>, handle: &Arc<Handle>) {
        if lobby.remove_handle(handle.id()).is_none() {
            return;
        }
        tracing::info!(lobby = %lobby.key(), handle = %handle.id(), "handle disconnected");
        self.inner
            .on_handle_disconnected
            .dispatch(&(Arc::clone(lobby), Arc::clone(handle)));
    }

    pub fn disconnect_handle(&self, handle: &Handle, reason: Option<&str>) {
        handle.disconnect(reason);
    }

    // ---- payloads

    pub fn add_handler(&self, handler: Arc<dyn PayloadHandler>) {
        write(&self.inner.handlers).push(handler);
    }

    pub fn clear_handlers(&self) {
        write(&self.inner.handlers).clear();
    }

    /// Serialize once, queue on every listed handle. Returns how many
    /// handles accepted the frame.
    pub fn send_payload(
        &self,
        handles: &[Arc<Handle>],
        app_id: u32,
        msg_type: &str,
        data: Value,
    ) -> Result<usize> {
        let text = Payload::new(app_id, msg_type, data).encode()?;
        Ok(handles.iter().filter(|h| h.send_text(text.clone())).count())
    }

    /// Process one raw inbound text frame. Malformed frames are dropped.
    pub async fn handle_text(&self, lobby: &Arc<Lobby>, handle: &Arc<Handle>, text: &str) {
        match Frame::decode(text) {
            Ok(frame) => self.handle_frame(lobby, handle, frame).await,
            Err(e) => {
                tracing::debug!(lobby = %lobby.key(), handle = %handle.id(), error = %e, "malformed frame dropped");
            }
        }
    }

    pub async fn handle_frame(&self, lobby: &Arc<Lobby>, handle: &Arc<Handle>, frame: Frame) {
        let payload = match frame {
            Frame::Payload(p) => p,
            Frame::Keepalive(_) => return,
            Frame::Close { reason } => {
                tracing::debug!(handle = %handle.id(), reason = reason.as_deref().unwrap_or(""), "peer is closing");
                return;
            }
        };

        let answer = if payload.is_sync_request() {
            let sent = self.full_sync(lobby, handle);
            tracing::debug!(lobby = %lobby.key(), handle = %handle.id(), entities = sent, "full sync sent");
            Value::String(SYNC_OK.to_owned())
        } else {
            self.dispatch(&payload, lobby, handle).await
        };

        if payload.correlation_id.is_some() {
            match payload.answer(answer).encode() {
                Ok(text) => {
                    handle.send_text(text);
                }
                Err(e) => {
                    tracing::warn!(handle = %handle.id(), error = %e, "answer not encodable");
                }
            }
        }
    }

    /// Push every live entity's snapshot to `handle` and start sending it
    /// incremental ops. Returns the number of snapshots queued.
    pub fn full_sync(&self, lobby: &Lobby, handle: &Handle) -> usize {
        handle.mark_full_sync();
        let entities = lobby.registry().sync_order();
        entities.iter().filter(|e| e.send_snapshot_to(handle)).count()
    }

    async fn dispatch(&self, payload: &Payload, lobby: &Arc<Lobby>, handle: &Arc<Handle>) -> Value {
        let handlers = read(&self.inner.handlers).clone();
        let mut answers = Vec::new();
        for h in handlers {
            if let Some(answer) = h.on_payload(payload, lobby, handle).await {
                answers.push(answer);
            }
        }
        match answers.len() {
            0 => Value::Null,
            1 => answers.pop().unwrap_or(Value::Null),
            n => {
                tracing::error!(
                    lobby = %lobby.key(),
                    handle = %handle.id(),
                    r#type = %payload.msg_type,
                    answers = n,
                    "several handlers answered one payload; answering null"
                );
                Value::Null
            }
        }
    }
}
