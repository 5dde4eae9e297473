//! Lobbies and handles.
//!
//! A lobby groups the handles (one per connected peer) and the shared
//! entities of one session. Entity ops are fanned out to the lobby's handles
//! through per-handle outbound queues; the queue is drained by the handle's
//! connection task, so a slow peer never blocks a broadcast.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde_json::Value;
use tokio::sync::mpsc;

use lobbysync_core::guard::{lock, read, write};
use lobbysync_core::protocol::{EntityId, EntityKind, EntityOp, Payload};

use crate::entities::{EntityRegistry, SharedEntity};

/// Opaque per-connection identity, unique for the manager's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Application fields attached to a handle at admission.
#[derive(Debug, Clone, Default)]
pub struct HandleFields {
    pub name: String,
    pub data: Value,
}

impl HandleFields {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Value::Null,
        }
    }
}

/// Message queued for a handle's connection task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    /// Send the close-with-reason frame (if any), then terminate.
    Close(Option<String>),
}

/// Server-side representative of one live connection.
pub struct Handle {
    id: HandleId,
    fields: HandleFields,
    tx: mpsc::UnboundedSender<Outbound>,
    full_sync: AtomicBool,
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("name", &self.fields.name)
            .field("full_sync", &self.has_full_sync())
            .finish()
    }
}

impl Handle {
    pub(crate) fn new(
        id: HandleId,
        fields: HandleFields,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(Self {
            id,
            fields,
            tx,
            full_sync: AtomicBool::new(false),
        });
        (handle, rx)
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn fields(&self) -> &HandleFields {
        &self.fields
    }

    /// True once the peer asked for (and got) a full entity sync.
    pub fn has_full_sync(&self) -> bool {
        self.full_sync.load(Ordering::Acquire)
    }

    pub(crate) fn mark_full_sync(&self) {
        self.full_sync.store(true, Ordering::Release);
    }

    /// Queue a text frame. Returns false once the connection is gone.
    pub fn send_text(&self, text: String) -> bool {
        self.tx.send(Outbound::Text(text)).is_ok()
    }

    /// Ask the connection task to close, optionally telling the peer why.
    pub fn disconnect(&self, reason: Option<&str>) {
        if self.tx.send(Outbound::Close(reason.map(str::to_owned))).is_err() {
            tracing::debug!(handle = %self.id, "disconnect on a closed handle");
        }
    }
}

/// Named session: handles + shared entities.
pub struct Lobby {
    key: String,
    handles: RwLock<Vec<Arc<Handle>>>,
    entities: Mutex<EntityRegistry>,
}

impl fmt::Debug for Lobby {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lobby")
            .field("key", &self.key)
            .field("handles", &self.handle_count())
            .field("entities", &self.entity_count())
            .finish()
    }
}

impl Lobby {
    pub(crate) fn new(key: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            key: key.into(),
            handles: RwLock::new(Vec::new()),
            entities: Mutex::new(EntityRegistry::new()),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn handles(&self) -> Vec<Arc<Handle>> {
        read(&self.handles).clone()
    }

    pub fn handle_count(&self) -> usize {
        read(&self.handles).len()
    }

    pub(crate) fn add_handle(&self, handle: Arc<Handle>) {
        write(&self.handles).push(handle);
    }

    pub(crate) fn remove_handle(&self, id: HandleId) -> Option<Arc<Handle>> {
        let mut handles = write(&self.handles);
        let pos = handles.iter().position(|h| h.id() == id)?;
        Some(handles.remove(pos))
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, EntityRegistry> {
        lock(&self.entities)
    }

    pub fn entity_count(&self) -> usize {
        self.registry().len()
    }

    pub fn entity(&self, app_id: u32, key: &str) -> Option<SharedEntity> {
        self.registry().get(&EntityId::new(app_id, key))
    }

    /// Fan an entity op out to every handle that has had its full sync.
    pub(crate) fn broadcast_op(&self, app_id: u32, kind: EntityKind, op: &EntityOp) {
        let text = match op
            .to_value()
            .and_then(|d| Payload::new(app_id, kind.tag(), d).encode())
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(lobby = %self.key, key = %op.key, error = %e, "entity op not encodable");
                return;
            }
        };
        for h in read(&self.handles).iter().filter(|h| h.has_full_sync()) {
            if !h.send_text(text.clone()) {
                tracing::debug!(lobby = %self.key, handle = %h.id(), "op dropped for closing handle");
            }
        }
    }
}
