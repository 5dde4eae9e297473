//! Shared entity core: identity, lifecycle and emission.
//!
//! An entity is a closed union over its kind (object or list) with shared
//! identity fields. Application code holds cheap clones ([`SharedObject`],
//! [`SharedList`]); the lobby registry holds another clone so a full sync can
//! snapshot every live entity.
//!
//! Lock order: list entity -> child entity -> lobby registry -> lobby handles.
//!
//! [`SharedObject`]: super::SharedObject
//! [`SharedList`]: super::SharedList

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::{Map, Value};

use lobbysync_core::error::{Result, SyncError};
use lobbysync_core::guard::lock;
use lobbysync_core::protocol::{EntityId, EntityKind, EntityOp, Payload};
use lobbysync_core::short_uid;

use super::list::{self, ListItem};
use crate::session::{Handle, Lobby};

pub(crate) enum EntityValue {
    Object(Map<String, Value>),
    List(Vec<ListItem>),
}

pub(crate) struct EntityState {
    pub(crate) key: Option<String>,
    pub(crate) app_id: u32,
    pub(crate) parent_key: Option<String>,
    pub(crate) lobby: Option<Weak<Lobby>>,
    pub(crate) disposed: bool,
    pub(crate) value: EntityValue,
}

impl EntityState {
    pub(crate) fn kind(&self) -> EntityKind {
        match self.value {
            EntityValue::Object(_) => EntityKind::Object,
            EntityValue::List(_) => EntityKind::List,
        }
    }

    pub(crate) fn key_str(&self) -> &str {
        self.key.as_deref().unwrap_or_default()
    }

    /// Lobby to emit through; `None` when unattached, disposed or the lobby is gone.
    pub(crate) fn live_lobby(&self) -> Option<Arc<Lobby>> {
        if self.disposed {
            return None;
        }
        self.lobby.as_ref()?.upgrade()
    }

    /// Broadcast `op`; a silent no-op for unattached or disposed entities.
    pub(crate) fn emit(&self, op: EntityOp) {
        if let Some(lobby) = self.live_lobby() {
            lobby.broadcast_op(self.app_id, self.kind(), &op);
        }
    }

    fn snapshot_value(&self) -> Value {
        match &self.value {
            EntityValue::Object(map) => Value::Object(map.clone()),
            EntityValue::List(items) => Value::Array(items.iter().map(ListItem::to_wire).collect()),
        }
    }

    fn create_op(&self) -> EntityOp {
        EntityOp::create(self.key_str(), self.snapshot_value(), self.parent_key.as_deref())
    }
}

/// Kind-erased handle to one shared entity.
#[derive(Clone)]
pub struct SharedEntity {
    cell: Arc<Mutex<EntityState>>,
}

impl SharedEntity {
    pub(crate) fn new(value: EntityValue) -> Self {
        Self {
            cell: Arc::new(Mutex::new(EntityState {
                key: None,
                app_id: 0,
                parent_key: None,
                lobby: None,
                disposed: false,
                value,
            })),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, EntityState> {
        lock(&self.cell)
    }

    pub fn kind(&self) -> EntityKind {
        self.state().kind()
    }

    pub fn key(&self) -> Option<String> {
        self.state().key.clone()
    }

    pub fn app_id(&self) -> u32 {
        self.state().app_id
    }

    pub fn parent_key(&self) -> Option<String> {
        self.state().parent_key.clone()
    }

    pub fn is_attached(&self) -> bool {
        let st = self.state();
        !st.disposed && st.lobby.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.state().disposed
    }

    pub fn ptr_eq(&self, other: &SharedEntity) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Current value in wire form (list items that are objects become refs).
    pub fn snapshot(&self) -> Value {
        self.state().snapshot_value()
    }

    pub(crate) fn set_key(&self, key: String) -> Result<()> {
        let mut st = self.state();
        if st.lobby.is_some() {
            return Err(SyncError::InvalidState("cannot rename an attached entity"));
        }
        st.key = Some(key);
        Ok(())
    }

    pub fn attach(&self, lobby: &Arc<Lobby>, app_id: u32) -> Result<()> {
        self.attach_to(lobby, app_id, None)
    }

    /// Register in the lobby and announce. Nested objects of a pre-seeded
    /// list are attached and announced before the list itself.
    pub(crate) fn attach_to(
        &self,
        lobby: &Arc<Lobby>,
        app_id: u32,
        parent_key: Option<&str>,
    ) -> Result<()> {
        let mut st = self.state();
        if st.disposed {
            return Err(SyncError::InvalidState("entity disposed"));
        }
        if st.lobby.is_some() {
            return Err(SyncError::InvalidState("entity already attached"));
        }
        let key = st
            .key
            .get_or_insert_with(|| format!("@{}", short_uid(8)))
            .clone();

        lobby.registry().insert(
            EntityId::new(app_id, key.as_str()),
            parent_key.map(str::to_owned),
            self.clone(),
        )?;
        st.app_id = app_id;
        st.parent_key = parent_key.map(str::to_owned);
        st.lobby = Some(Arc::downgrade(lobby));

        // an item that cannot be announced must not be referenced either
        if let EntityValue::List(items) = &mut st.value {
            items.retain(|item| match item.as_object() {
                Some(child) => match child.entity().attach_to(lobby, app_id, Some(&key)) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(lobby = %lobby.key(), app_id, key = %key, error = %e, "list item dropped");
                        false
                    }
                },
                None => true,
            });
        }

        tracing::debug!(lobby = %lobby.key(), app_id, key = %key, kind = st.kind().tag(), "entity attached");
        let op = st.create_op();
        st.emit(op);
        Ok(())
    }

    /// Push this entity's full value to one handle (full sync path).
    pub(crate) fn send_snapshot_to(&self, handle: &Handle) -> bool {
        let st = self.state();
        if st.live_lobby().is_none() {
            return false;
        }
        let payload = st
            .create_op()
            .to_value()
            .and_then(|d| Payload::new(st.app_id, st.kind().tag(), d).encode());
        match payload {
            Ok(text) => handle.send_text(text),
            Err(e) => {
                tracing::warn!(key = %st.key_str(), error = %e, "snapshot not encodable");
                false
            }
        }
    }

    /// Announce destruction and deregister. Lists remove (and dispose) every
    /// item first. Disposal happens at most once.
    pub fn dispose(&self) {
        let mut st = self.state();
        if st.disposed {
            return;
        }
        if matches!(st.value, EntityValue::List(_)) {
            list::clear_items(&mut st);
        }

        let op = EntityOp::destroy(st.key_str());
        st.emit(op);
        if let (Some(lobby), Some(key)) = (st.live_lobby(), st.key.as_deref()) {
            lobby.registry().remove(&EntityId::new(st.app_id, key));
            tracing::debug!(lobby = %lobby.key(), app_id = st.app_id, key = %key, "entity disposed");
        }

        st.disposed = true;
        st.lobby = None;
        st.parent_key = None;
        match &mut st.value {
            EntityValue::Object(map) => map.clear(),
            EntityValue::List(items) => items.clear(),
        }
    }
}
