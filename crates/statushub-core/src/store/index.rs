// ── Association index ──
//
// One-directional multimap `K -> {V}`. The hub keeps two instances as
// mirrors of each other (item -> observers, observer -> items); this
// type only guarantees that no key ever maps to an empty set.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Result of [`AssociationIndex::trim_or_remove`].
#[derive(Debug)]
pub struct TrimOutcome<K, V> {
    /// Keys whose value set became empty and were deleted.
    pub removed_keys: HashSet<K>,
    /// Values that were actually removed from at least one key.
    pub trimmed_values: HashSet<V>,
}

impl<K, V> Default for TrimOutcome<K, V> {
    fn default() -> Self {
        Self {
            removed_keys: HashSet::new(),
            trimmed_values: HashSet::new(),
        }
    }
}

/// Multimap from keys to non-empty value sets.
#[derive(Debug, Clone)]
pub struct AssociationIndex<K, V> {
    entries: HashMap<K, HashSet<V>>,
}

impl<K, V> Default for AssociationIndex<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K, V> AssociationIndex<K, V>
where
    K: Eq + Hash + Clone,
    V: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Union `values` into the set of every key in `keys`.
    ///
    /// Returns the keys that had no entry before this call. Adding an
    /// empty value set is a no-op so no empty entry is ever created.
    pub fn add<I>(&mut self, keys: I, values: &HashSet<V>) -> HashSet<K>
    where
        I: IntoIterator<Item = K>,
    {
        let mut created = HashSet::new();
        if values.is_empty() {
            return created;
        }
        for key in keys {
            match self.entries.entry(key) {
                Entry::Occupied(mut slot) => {
                    slot.get_mut().extend(values.iter().cloned());
                }
                Entry::Vacant(slot) => {
                    created.insert(slot.key().clone());
                    slot.insert(values.clone());
                }
            }
        }
        created
    }

    /// Replace the value set of `key` wholesale.
    ///
    /// Returns the values that were associated before but are not in
    /// `new_values`. An empty `new_values` deletes the entry.
    pub fn update(&mut self, key: K, new_values: HashSet<V>) -> HashSet<V> {
        let previous = if new_values.is_empty() {
            self.entries.remove(&key)
        } else {
            self.entries.insert(key, new_values.clone())
        };
        previous
            .unwrap_or_default()
            .into_iter()
            .filter(|v| !new_values.contains(v))
            .collect()
    }

    /// Remove `values` from every key in `keys`, deleting keys left empty.
    pub fn trim_or_remove<'a, I>(&mut self, keys: I, values: &HashSet<V>) -> TrimOutcome<K, V>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let mut outcome = TrimOutcome::default();
        for key in keys {
            let Some(set) = self.entries.get_mut(key) else {
                continue;
            };
            for value in values {
                if set.remove(value) {
                    outcome.trimmed_values.insert(value.clone());
                }
            }
            if set.is_empty() {
                self.entries.remove(key);
                outcome.removed_keys.insert(key.clone());
            }
        }
        outcome
    }

    /// Delete `key` outright, returning its former value set.
    pub fn remove(&mut self, key: &K) -> HashSet<V> {
        self.entries.remove(key).unwrap_or_default()
    }

    /// Values of `key`, or an empty set when absent.
    pub fn values(&self, key: &K) -> HashSet<V> {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    /// Borrowing variant of [`values`](Self::values).
    pub fn get(&self, key: &K) -> Option<&HashSet<V>> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> HashSet<K> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &HashSet<V>)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
