//! Per-lobby entity registry: a flat arena keyed by `(app_id, key)`.

use std::collections::HashMap;

use lobbysync_core::error::{Result, SyncError};
use lobbysync_core::protocol::EntityId;

use super::SharedEntity;

struct Entry {
    seq: u64,
    parent_key: Option<String>,
    entity: SharedEntity,
}

#[derive(Default)]
pub struct EntityRegistry {
    entries: HashMap<EntityId, Entry>,
    next_seq: u64,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(
        &mut self,
        id: EntityId,
        parent_key: Option<String>,
        entity: SharedEntity,
    ) -> Result<()> {
        if self.entries.contains_key(&id) {
            return Err(SyncError::KeyConflict(id.to_string()));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            id,
            Entry {
                seq,
                parent_key,
                entity,
            },
        );
        Ok(())
    }

    pub(crate) fn remove(&mut self, id: &EntityId) -> Option<SharedEntity> {
        self.entries.remove(id).map(|e| e.entity)
    }

    pub fn get(&self, id: &EntityId) -> Option<SharedEntity> {
        self.entries.get(id).map(|e| e.entity.clone())
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<(&EntityId, u64)> = self.entries.iter().map(|(id, e)| (id, e.seq)).collect();
        ids.sort_by_key(|(_, seq)| *seq);
        ids.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Entities owned by no list, in attach order.
    pub fn roots(&self) -> Vec<SharedEntity> {
        let mut roots: Vec<&Entry> = self
            .entries
            .values()
            .filter(|e| e.parent_key.is_none())
            .collect();
        roots.sort_by_key(|e| e.seq);
        roots.into_iter().map(|e| e.entity.clone()).collect()
    }

    /// Every entity for a full sync: nested objects first so the lists
    /// referencing them resolve on arrival, then attach order.
    pub fn sync_order(&self) -> Vec<SharedEntity> {
        let mut all: Vec<&Entry> = self.entries.values().collect();
        all.sort_by_key(|e| (e.parent_key.is_none(), e.seq));
        all.into_iter().map(|e| e.entity.clone()).collect()
    }
}
