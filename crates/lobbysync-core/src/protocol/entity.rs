//! Entity operation vocabulary (`@SO` / `@SL` payload data).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, SyncError};

/// Payload type of shared-object operations.
pub const SHARED_OBJECT: &str = "@SO";
/// Payload type of shared-list operations.
pub const SHARED_LIST: &str = "@SL";

/// Entity kind, carried by the payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Object,
    List,
}

impl EntityKind {
    pub fn tag(self) -> &'static str {
        match self {
            EntityKind::Object => SHARED_OBJECT,
            EntityKind::List => SHARED_LIST,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            SHARED_OBJECT => Some(EntityKind::Object),
            SHARED_LIST => Some(EntityKind::List),
            _ => None,
        }
    }
}

/// Operation codes (`a` field of the op).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "C")]
    Create,
    #[serde(rename = "D")]
    Destroy,
    #[serde(rename = "A")]
    Add,
    #[serde(rename = "R")]
    Remove,
    #[serde(rename = "M")]
    Mutate,
    /// List only: set one property of the object item at index `n`; the
    /// property name travels in `p`.
    #[serde(rename = "P")]
    MutateNestedProp,
}

/// Property name (object) or index (list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpName {
    Index(usize),
    Prop(String),
}

impl OpName {
    pub fn as_index(&self) -> Option<usize> {
        match self {
            OpName::Index(i) => Some(*i),
            OpName::Prop(_) => None,
        }
    }

    pub fn as_prop(&self) -> Option<&str> {
        match self {
            OpName::Prop(p) => Some(p),
            OpName::Index(_) => None,
        }
    }
}

/// One incremental change to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityOp {
    #[serde(rename = "a")]
    pub action: Action,
    #[serde(rename = "k")]
    pub key: String,
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<OpName>,
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Key of the owning list, so the container can refresh too.
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
}

impl EntityOp {
    fn bare(action: Action, key: &str) -> Self {
        Self {
            action,
            key: key.to_owned(),
            name: None,
            value: None,
            parent_key: None,
        }
    }

    pub fn create(key: &str, value: Value, parent_key: Option<&str>) -> Self {
        Self {
            value: Some(value),
            parent_key: parent_key.map(str::to_owned),
            ..Self::bare(Action::Create, key)
        }
    }

    pub fn destroy(key: &str) -> Self {
        Self::bare(Action::Destroy, key)
    }

    pub fn mutate_prop(key: &str, prop: &str, value: Value, parent_key: Option<&str>) -> Self {
        Self {
            name: Some(OpName::Prop(prop.to_owned())),
            value: Some(value),
            parent_key: parent_key.map(str::to_owned),
            ..Self::bare(Action::Mutate, key)
        }
    }

    pub fn remove_prop(key: &str, prop: &str, parent_key: Option<&str>) -> Self {
        Self {
            name: Some(OpName::Prop(prop.to_owned())),
            parent_key: parent_key.map(str::to_owned),
            ..Self::bare(Action::Remove, key)
        }
    }

    pub fn add_item(key: &str, value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::bare(Action::Add, key)
        }
    }

    pub fn remove_index(key: &str, index: usize) -> Self {
        Self {
            name: Some(OpName::Index(index)),
            ..Self::bare(Action::Remove, key)
        }
    }

    pub fn mutate_index(key: &str, index: usize, value: Value) -> Self {
        Self {
            name: Some(OpName::Index(index)),
            value: Some(value),
            ..Self::bare(Action::Mutate, key)
        }
    }

    /// `p` carries the item's property name for this action.
    pub fn mutate_nested_prop(key: &str, index: usize, prop: &str, value: Value) -> Self {
        Self {
            name: Some(OpName::Index(index)),
            value: Some(value),
            parent_key: Some(prop.to_owned()),
            ..Self::bare(Action::MutateNestedProp, key)
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self)
            .map_err(|e| SyncError::Internal(format!("entity op encode failed: {e}")))
    }

    pub fn from_value(v: Value) -> Result<Self> {
        serde_json::from_value(v)
            .map_err(|e| SyncError::BadRequest(format!("invalid entity op: {e}")))
    }
}

/// Registry identity of an entity: keys are unique per app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    pub app_id: u32,
    pub key: String,
}

impl EntityId {
    pub fn new(app_id: u32, key: impl Into<String>) -> Self {
        Self {
            app_id,
            key: key.into(),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_id, self.key)
    }
}

/// Serialized form of a shared object held by a list: `{ "ref": key }`.
pub fn item_ref(key: &str) -> Value {
    json!({ "ref": key })
}

/// Key of a reference marker, if `v` is one.
pub fn parse_item_ref(v: &Value) -> Option<&str> {
    let obj = v.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    obj.get("ref")?.as_str()
}
