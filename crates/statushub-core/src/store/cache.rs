// ── Latest-value cache ──
//
// One entry per data item id, holding the merge of every accepted
// update. Only the hub's worker task touches it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::gateway::CacheGate;
use crate::model::{DataItem, DataItemId};

/// Latest known value of every data item seen so far.
pub struct DataItemCache {
    entries: HashMap<DataItemId, DataItem>,
    gate: Arc<dyn CacheGate>,
}

impl DataItemCache {
    pub fn new(gate: Arc<dyn CacheGate>) -> Self {
        Self {
            entries: HashMap::new(),
            gate,
        }
    }

    /// Offer `candidate` to the cache.
    ///
    /// Rejected candidates leave the cache untouched and return `false`.
    /// Accepted ones are stored as a fresh copy on first sight and merged
    /// into the stored value afterwards.
    pub fn accept(&mut self, candidate: &DataItem) -> bool {
        let id = candidate.id();
        if !self.gate.should_accept(candidate) {
            debug!(item = %id, "cache gate rejected value");
            return false;
        }
        match self.entries.get_mut(&id) {
            Some(stored) => {
                stored.merge_from(candidate);
            }
            None => {
                self.entries.insert(id, candidate.clone());
            }
        }
        debug!(item = %id, "cache updated");
        true
    }

    /// Snapshots of the cached values for `ids`, ordered by id.
    /// Ids without an entry are skipped.
    pub fn lookup<'a, I>(&self, ids: I) -> Vec<DataItem>
    where
        I: IntoIterator<Item = &'a DataItemId>,
    {
        let mut found: Vec<DataItem> = ids
            .into_iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect();
        found.sort_by_key(DataItem::id);
        found.dedup_by_key(|item| item.id());
        found
    }

    pub fn get(&self, id: DataItemId) -> Option<&DataItem> {
        self.entries.get(&id)
    }

    /// Drop the entry for `id`. Returns whether one existed.
    pub fn evict(&mut self, id: DataItemId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataItem> {
        self.entries.values()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
