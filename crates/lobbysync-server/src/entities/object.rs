//! Shared object: a property map replicated property by property.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use lobbysync_core::error::{Result, SyncError};
use lobbysync_core::protocol::EntityOp;

use super::entity::{EntityState, EntityValue, SharedEntity};
use crate::session::Lobby;

#[derive(Clone)]
pub struct SharedObject {
    entity: SharedEntity,
}

impl Default for SharedObject {
    fn default() -> Self {
        Self::new()
    }
}

fn props(st: &EntityState) -> Option<&Map<String, Value>> {
    match &st.value {
        EntityValue::Object(map) => Some(map),
        EntityValue::List(_) => None,
    }
}

/// Store `resolved` under `prop` and emit the matching op, if anything changed.
fn apply(st: &mut EntityState, prop: &str, resolved: Option<Value>) {
    let key = st.key_str().to_owned();
    let parent = st.parent_key.clone();
    let EntityValue::Object(map) = &mut st.value else {
        return;
    };
    let op = match resolved {
        None => {
            if map.remove(prop).is_none() {
                return;
            }
            EntityOp::remove_prop(&key, prop, parent.as_deref())
        }
        Some(v) => {
            if map.get(prop) == Some(&v) {
                return;
            }
            map.insert(prop.to_owned(), v.clone());
            EntityOp::mutate_prop(&key, prop, v, parent.as_deref())
        }
    };
    st.emit(op);
}

impl SharedObject {
    pub fn new() -> Self {
        Self::from_map(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            entity: SharedEntity::new(EntityValue::Object(map)),
        }
    }

    /// Build from any serializable struct/map.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        match serde_json::to_value(value) {
            Ok(Value::Object(map)) => Ok(Self::from_map(map)),
            Ok(_) => Err(SyncError::BadRequest("shared object needs a map value".into())),
            Err(e) => Err(SyncError::BadRequest(format!("shared object encode failed: {e}"))),
        }
    }

    pub fn with_key(self, key: impl Into<String>) -> Result<Self> {
        self.entity.set_key(key.into())?;
        Ok(self)
    }

    pub fn entity(&self) -> &SharedEntity {
        &self.entity
    }

    pub fn key(&self) -> Option<String> {
        self.entity.key()
    }

    pub fn attach(&self, lobby: &Arc<Lobby>, app_id: u32) -> Result<()> {
        self.entity.attach(lobby, app_id)
    }

    pub fn dispose(&self) {
        self.entity.dispose();
    }

    pub fn get(&self, prop: &str) -> Option<Value> {
        props(&self.entity.state())?.get(prop).cloned()
    }

    pub fn value(&self) -> Map<String, Value> {
        props(&self.entity.state()).cloned().unwrap_or_default()
    }

    /// Set (`Some`) or delete (`None`) a property. Emits Mutate/Remove only
    /// when the stored value actually changes. Returns the resolved value.
    pub fn mutate(&self, prop: &str, value: Option<Value>) -> Option<Value> {
        self.mutate_with(prop, |_| value)
    }

    /// Like [`mutate`](Self::mutate), with the new value computed from the
    /// previous one. `update` runs under the entity lock and must not touch
    /// this object.
    pub fn mutate_with<F>(&self, prop: &str, update: F) -> Option<Value>
    where
        F: FnOnce(Option<&Value>) -> Option<Value>,
    {
        let mut st = self.entity.state();
        let resolved = update(props(&st).and_then(|m| m.get(prop)));
        apply(&mut st, prop, resolved.clone());
        resolved
    }

    pub fn set(&self, prop: &str, value: impl Into<Value>) {
        self.mutate(prop, Some(value.into()));
    }

    pub fn remove(&self, prop: &str) {
        self.mutate(prop, None);
    }

    /// Mutate every key of `partial`.
    pub fn merge(&self, partial: Map<String, Value>) {
        let mut st = self.entity.state();
        for (prop, value) in partial {
            apply(&mut st, &prop, Some(value));
        }
    }

    /// Remove every property, one Remove op each.
    pub fn clear(&self) {
        let mut st = self.entity.state();
        let keys: Vec<String> = props(&st).map(|m| m.keys().cloned().collect()).unwrap_or_default();
        for prop in keys {
            apply(&mut st, &prop, None);
        }
    }

    pub fn remove_props(&self, props: &[&str]) {
        let mut st = self.entity.state();
        for prop in props {
            apply(&mut st, prop, None);
        }
    }
}
