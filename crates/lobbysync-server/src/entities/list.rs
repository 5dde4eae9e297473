//! Shared list: ordered values, where an item may be a nested shared object.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use lobbysync_core::error::{Result, SyncError};
use lobbysync_core::protocol::{item_ref, EntityOp};

use super::entity::{EntityState, EntityValue, SharedEntity};
use super::SharedObject;
use crate::session::Lobby;

/// One list item: a plain value, or a shared object sent as `{ "ref": key }`.
#[derive(Clone)]
pub enum ListItem {
    Value(Value),
    Object(SharedObject),
}

impl fmt::Debug for ListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListItem::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ListItem::Object(o) => f.debug_tuple("Object").field(&o.key()).finish(),
        }
    }
}

impl From<Value> for ListItem {
    fn from(v: Value) -> Self {
        ListItem::Value(v)
    }
}

impl From<SharedObject> for ListItem {
    fn from(o: SharedObject) -> Self {
        ListItem::Object(o)
    }
}

impl ListItem {
    pub fn as_object(&self) -> Option<&SharedObject> {
        match self {
            ListItem::Object(o) => Some(o),
            ListItem::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ListItem::Value(v) => Some(v),
            ListItem::Object(_) => None,
        }
    }

    /// Objects match by identity, values by equality.
    fn matches(&self, other: &ListItem) -> bool {
        match (self, other) {
            (ListItem::Object(a), ListItem::Object(b)) => a.entity().ptr_eq(b.entity()),
            (ListItem::Value(a), ListItem::Value(b)) => a == b,
            _ => false,
        }
    }

    pub(crate) fn to_wire(&self) -> Value {
        match self {
            ListItem::Value(v) => v.clone(),
            ListItem::Object(o) => item_ref(&o.key().unwrap_or_default()),
        }
    }
}

fn items(st: &EntityState) -> &[ListItem] {
    match &st.value {
        EntityValue::List(items) => items,
        EntityValue::Object(_) => &[],
    }
}

fn items_mut(st: &mut EntityState) -> Option<&mut Vec<ListItem>> {
    match &mut st.value {
        EntityValue::List(items) => Some(items),
        EntityValue::Object(_) => None,
    }
}

/// Attach an object item to the list's lobby, when the list is live.
fn adopt(st: &EntityState, lobby: Option<&Arc<Lobby>>, child: &SharedObject) -> Result<()> {
    if items(st).iter().any(|i| i.matches(&ListItem::Object(child.clone()))) {
        return Err(SyncError::InvalidState("object already in this list"));
    }
    match lobby {
        Some(lobby) => child.entity().attach_to(lobby, st.app_id, Some(st.key_str())),
        None if child.entity().is_attached() => {
            Err(SyncError::InvalidState("object attached elsewhere"))
        }
        None => Ok(()),
    }
}

/// Remove the item at `index`: dispose it if it is an object, emit Remove,
/// then drop it from the sequence.
pub(crate) fn remove_at(st: &mut EntityState, index: usize) -> Option<ListItem> {
    let child = items(st).get(index)?.as_object().cloned();
    if let Some(child) = child {
        child.dispose();
    }
    let op = EntityOp::remove_index(st.key_str(), index);
    st.emit(op);
    let items = items_mut(st)?;
    Some(items.remove(index))
}

pub(crate) fn clear_items(st: &mut EntityState) {
    while !items(st).is_empty() {
        remove_at(st, 0);
    }
}

#[derive(Clone)]
pub struct SharedList {
    entity: SharedEntity,
}

impl Default for SharedList {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedList {
    pub fn new() -> Self {
        Self::from_items(Vec::new())
    }

    /// Pre-seeded list; object items are attached along with the list.
    pub fn from_items(items: impl IntoIterator<Item = ListItem>) -> Self {
        Self {
            entity: SharedEntity::new(EntityValue::List(items.into_iter().collect())),
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

    pub fn len(&self) -> usize {
        items(&self.entity.state()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<ListItem> {
        items(&self.entity.state()).get(index).cloned()
    }

    pub fn items(&self) -> Vec<ListItem> {
        items(&self.entity.state()).to_vec()
    }

    /// Append. An object item is keyed and attached (its Create goes out)
    /// before the Add that references it.
    pub fn add(&self, item: impl Into<ListItem>) -> Result<()> {
        let item = item.into();
        let mut st = self.entity.state();
        if let ListItem::Object(child) = &item {
            adopt(&st, st.live_lobby().as_ref(), child)?;
        }
        let wire = item.to_wire();
        if let Some(items) = items_mut(&mut st) {
            items.push(item);
        }
        let op = EntityOp::add_item(st.key_str(), wire);
        st.emit(op);
        Ok(())
    }

    pub fn add_all(&self, items: impl IntoIterator<Item = ListItem>) -> Result<()> {
        for item in items {
            self.add(item)?;
        }
        Ok(())
    }

    /// Remove the first matching item. Absent items are a no-op.
    pub fn remove(&self, item: &ListItem) -> bool {
        let mut st = self.entity.state();
        let Some(index) = items(&st).iter().position(|i| i.matches(item)) else {
            tracing::debug!(key = %st.key_str(), ?item, "remove of an absent list item");
            return false;
        };
        remove_at(&mut st, index).is_some()
    }

    pub fn remove_value(&self, value: &Value) -> bool {
        self.remove(&ListItem::Value(value.clone()))
    }

    pub fn remove_at(&self, index: usize) -> Option<ListItem> {
        remove_at(&mut self.entity.state(), index)
    }

    /// Remove every item, one Remove op each.
    pub fn clear(&self) {
        clear_items(&mut self.entity.state());
    }

    /// Replace the item at `index`. Returns false when out of range or unchanged.
    pub fn set(&self, index: usize, item: impl Into<ListItem>) -> Result<bool> {
        let item = item.into();
        let mut st = self.entity.state();
        let Some(old) = items(&st).get(index).cloned() else {
            return Ok(false);
        };
        if old.matches(&item) {
            return Ok(false);
        }
        if let ListItem::Object(child) = &item {
            adopt(&st, st.live_lobby().as_ref(), child)?;
        }
        if let ListItem::Object(previous) = &old {
            previous.dispose();
        }
        let wire = item.to_wire();
        if let Some(slot) = items_mut(&mut st).and_then(|items| items.get_mut(index)) {
            *slot = item;
        }
        let op = EntityOp::mutate_index(st.key_str(), index, wire);
        st.emit(op);
        Ok(true)
    }

    /// Set one property of the plain-object item at `index`.
    pub fn patch_item(&self, index: usize, prop: &str, value: Value) -> bool {
        let mut st = self.entity.state();
        let Some(items) = items_mut(&mut st) else {
            return false;
        };
        match items.get_mut(index) {
            Some(ListItem::Value(Value::Object(map))) => {
                if map.get(prop) == Some(&value) {
                    return false;
                }
                map.insert(prop.to_owned(), value.clone());
            }
            _ => return false,
        }
        let op = EntityOp::mutate_nested_prop(st.key_str(), index, prop, value);
        st.emit(op);
        true
    }
}
