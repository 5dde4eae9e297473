//! Client entity mirror.
//!
//! A read-only replica of the lobby's shared entities keyed by
//! `(app_id, key)`. Every applied op stores a fresh value (clone and
//! replace), so a consumer holding the previous `Arc` can tell by identity
//! that something changed.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use lobbysync_core::emitter::{Emitter, ListenerId};
use lobbysync_core::error::{Result, SyncError};
use lobbysync_core::guard::lock;
use lobbysync_core::protocol::payload::{SYNC_OK, SYNC_REQUEST};
use lobbysync_core::protocol::{parse_item_ref, Action, EntityId, EntityKind, EntityOp, Payload};

use crate::socket::ClientSocket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Create,
    Destroy,
    Mutate,
}

/// Update notification for one mirrored key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityUpdate {
    pub app_id: u32,
    pub key: String,
    pub kind: UpdateKind,
}

struct MirrorEntry {
    kind: EntityKind,
    value: Arc<Value>,
}

#[derive(Default)]
struct Flags {
    started: bool,
    syncing: bool,
    /// Connection dropped while mirroring; resync on the next open.
    recover: bool,
    listeners: Option<(ListenerId, ListenerId)>,
}

struct MirrorInner {
    socket: ClientSocket,
    store: Mutex<HashMap<EntityId, MirrorEntry>>,
    flags: Mutex<Flags>,
    on_updated: Emitter<EntityUpdate>,
    on_synced: Emitter<bool>,
}

#[derive(Clone)]
pub struct EntityMirror {
    inner: Arc<MirrorInner>,
}

impl EntityMirror {
    pub fn new(socket: ClientSocket) -> Self {
        Self {
            inner: Arc::new(MirrorInner {
                socket,
                store: Mutex::new(HashMap::new()),
                flags: Mutex::new(Flags::default()),
                on_updated: Emitter::new(),
                on_synced: Emitter::new(),
            }),
        }
    }

    pub fn socket(&self) -> &ClientSocket {
        &self.inner.socket
    }

    pub fn on_updated(&self) -> &Emitter<EntityUpdate> {
        &self.inner.on_updated
    }

    /// `true` once a full sync landed, `false` when the mirror goes stale.
    pub fn on_synced(&self) -> &Emitter<bool> {
        &self.inner.on_synced
    }

    pub fn is_started(&self) -> bool {
        lock(&self.inner.flags).started
    }

    pub fn is_syncing(&self) -> bool {
        lock(&self.inner.flags).syncing
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.store).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- reads

    /// Stored value as is (list items that are objects stay references).
    pub fn get(&self, app_id: u32, key: &str) -> Option<Arc<Value>> {
        lock(&self.inner.store)
            .get(&EntityId::new(app_id, key))
            .map(|e| Arc::clone(&e.value))
    }

    /// Value of `(app_id, key)`. With `deep`, a list's `{ "ref": key }`
    /// items are replaced by the referenced value; references that do not
    /// resolve yet are left out.
    pub fn get_value(&self, app_id: u32, key: &str, deep: bool) -> Option<Value> {
        let store = lock(&self.inner.store);
        resolve(&store, app_id, key, deep)
    }

    /// Every mirrored entity, deep-resolved, grouped by app.
    pub fn get_all(&self) -> BTreeMap<u32, BTreeMap<String, Value>> {
        let store = lock(&self.inner.store);
        let mut out: BTreeMap<u32, BTreeMap<String, Value>> = BTreeMap::new();
        for id in store.keys() {
            if let Some(v) = resolve(&store, id.app_id, &id.key, true) {
                out.entry(id.app_id).or_default().insert(id.key.clone(), v);
            }
        }
        out
    }

    // ---- ops

    /// Apply one `@SO`/`@SL` payload. Returns false when nothing changed.
    pub fn apply(&self, payload: &Payload) -> bool {
        let Some(kind) = EntityKind::from_tag(&payload.msg_type) else {
            return false;
        };
        let op = match EntityOp::from_value(payload.data.clone()) {
            Ok(op) => op,
            Err(e) => {
                tracing::warn!(app_id = payload.app_id, error = %e, "invalid entity op");
                return false;
            }
        };
        let app_id = payload.app_id;
        let id = EntityId::new(app_id, op.key.as_str());

        let update = {
            let mut store = lock(&self.inner.store);
            match op.action {
                Action::Create => {
                    let Some(value) = op.value.clone().filter(|v| !v.is_null()) else {
                        tracing::warn!(%id, "create without a value");
                        return false;
                    };
                    store.insert(
                        id,
                        MirrorEntry {
                            kind,
                            value: Arc::new(value),
                        },
                    );
                    UpdateKind::Create
                }
                Action::Destroy => {
                    if store.remove(&id).is_none() {
                        return false;
                    }
                    UpdateKind::Destroy
                }
                _ => {
                    let Some(entry) = store.get_mut(&id) else {
                        // can happen while a full sync is still in flight
                        tracing::warn!(%id, action = ?op.action, "op for an unknown entity");
                        return false;
                    };
                    let Some(next) = mutated(entry.kind, &entry.value, &op) else {
                        tracing::warn!(%id, action = ?op.action, "op does not apply");
                        return false;
                    };
                    entry.value = Arc::new(next);
                    UpdateKind::Mutate
                }
            }
        };

        // `p` names the item's property for nested-prop ops, not a container
        let parent = match op.action {
            Action::MutateNestedProp => None,
            _ => op.parent_key,
        };
        self.inner.on_updated.dispatch(&EntityUpdate {
            app_id,
            key: op.key,
            kind: update,
        });
        if let Some(parent) = parent {
            self.inner.on_updated.dispatch(&EntityUpdate {
                app_id,
                key: parent,
                kind: update,
            });
        }
        true
    }

    pub fn clear(&self) {
        lock(&self.inner.store).clear();
    }

    // ---- resync

    /// Subscribe to the socket and run the first full sync.
    pub async fn start(&self) -> Result<()> {
        {
            let mut flags = lock(&self.inner.flags);
            if !self.inner.socket.is_connected() {
                return Err(SyncError::NotConnected);
            }
            if flags.started || flags.syncing {
                return Err(SyncError::InvalidState("mirror already started"));
            }
            flags.syncing = true;
            flags.listeners = Some(self.listen());
        }

        let answer = self.request_sync().await;

        let listeners = {
            let mut flags = lock(&self.inner.flags);
            flags.syncing = false;
            match &answer {
                Ok(()) => {
                    flags.started = true;
                    None
                }
                Err(_) => flags.listeners.take(),
            }
        };
        match answer {
            Ok(()) => {
                tracing::debug!("entity mirror started");
                self.inner.on_synced.dispatch(&true);
                Ok(())
            }
            Err(e) => {
                self.unlisten(listeners);
                Err(e)
            }
        }
    }

    /// Drop every mirrored entity and unsubscribe from the socket.
    pub fn stop(&self) -> Result<()> {
        let listeners = {
            let mut flags = lock(&self.inner.flags);
            if !flags.started || flags.syncing {
                return Err(SyncError::InvalidState("mirror not started or syncing"));
            }
            flags.started = false;
            flags.recover = false;
            flags.listeners.take()
        };
        self.clear();
        self.unlisten(listeners);
        self.inner.on_synced.dispatch(&false);
        Ok(())
    }

    async fn request_sync(&self) -> Result<()> {
        let answer = self
            .inner
            .socket
            .send_payload_with_return(0, SYNC_REQUEST, Value::Null)
            .await?;
        match answer.as_str() {
            Some(SYNC_OK) => Ok(()),
            _ => Err(SyncError::Refused(format!("unexpected sync answer: {answer}"))),
        }
    }

    fn listen(&self) -> (ListenerId, ListenerId) {
        let weak = Arc::downgrade(&self.inner);
        let payloads = self.inner.socket.on_payload().add(move |payload| {
            if let Some(inner) = weak.upgrade() {
                EntityMirror { inner }.apply(payload);
            }
        });
        let weak = Arc::downgrade(&self.inner);
        let states = self
            .inner
            .socket
            .on_connection_updated()
            .add(move |connected| {
                if let Some(inner) = weak.upgrade() {
                    EntityMirror { inner }.connection_changed(*connected);
                }
            });
        (payloads, states)
    }

    fn unlisten(&self, listeners: Option<(ListenerId, ListenerId)>) {
        if let Some((payloads, states)) = listeners {
            self.inner.socket.on_payload().remove(payloads);
            self.inner.socket.on_connection_updated().remove(states);
        }
    }

    fn connection_changed(&self, connected: bool) {
        if !connected {
            lock(&self.inner.flags).recover = true;
            self.inner.on_synced.dispatch(&false);
            return;
        }

        {
            let mut flags = lock(&self.inner.flags);
            if !flags.recover || flags.syncing {
                return;
            }
            flags.recover = false;
            flags.syncing = true;
        }
        self.clear();

        let mirror = self.clone();
        tokio::spawn(async move {
            let result = mirror.request_sync().await;
            {
                let mut flags = lock(&mirror.inner.flags);
                flags.syncing = false;
                if result.is_err() {
                    flags.recover = true;
                }
            }
            match result {
                Ok(()) => {
                    tracing::debug!("entity mirror recovered");
                    mirror.inner.on_synced.dispatch(&true);
                }
                Err(e) => tracing::error!(error = %e, "unable to recover shared entities"),
            }
        });
    }
}

fn resolve(store: &HashMap<EntityId, MirrorEntry>, app_id: u32, key: &str, deep: bool) -> Option<Value> {
    let entry = store.get(&EntityId::new(app_id, key))?;
    match entry.value.as_ref() {
        Value::Array(items) if deep => Some(Value::Array(
            items
                .iter()
                .filter_map(|item| match parse_item_ref(item) {
                    Some(child) => store
                        .get(&EntityId::new(app_id, child))
                        .map(|e| e.value.as_ref().clone()),
                    None => Some(item.clone()),
                })
                .collect(),
        )),
        other => Some(other.clone()),
    }
}

/// The value after `op`, built on a copy of `current`.
fn mutated(kind: EntityKind, current: &Value, op: &EntityOp) -> Option<Value> {
    let value = || op.value.clone().unwrap_or(Value::Null);
    match (kind, current) {
        (EntityKind::Object, Value::Object(map)) => {
            let prop = op.name.as_ref()?.as_prop()?;
            let mut next = map.clone();
            match op.action {
                Action::Mutate => {
                    next.insert(prop.to_owned(), value());
                }
                Action::Remove => {
                    next.remove(prop);
                }
                _ => return None,
            }
            Some(Value::Object(next))
        }
        (EntityKind::List, Value::Array(items)) => {
            let mut next = items.clone();
            match op.action {
                Action::Add => next.push(value()),
                Action::Remove => {
                    let index = op.name.as_ref()?.as_index()?;
                    if index >= next.len() {
                        return None;
                    }
                    next.remove(index);
                }
                Action::Mutate => {
                    let index = op.name.as_ref()?.as_index()?;
                    *next.get_mut(index)? = value();
                }
                Action::MutateNestedProp => {
                    let index = op.name.as_ref()?.as_index()?;
                    let prop = op.parent_key.as_deref()?;
                    let mut item: Map<String, Value> = next.get(index)?.as_object()?.clone();
                    item.insert(prop.to_owned(), value());
                    next[index] = Value::Object(item);
                }
                _ => return None,
            }
            Some(Value::Array(next))
        }
        _ => None,
    }
}
