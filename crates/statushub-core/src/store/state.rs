// ── Worker-owned hub state ──
//
// Both association indices, the cache and the activation counter live
// here and are only ever mutated by the command processor. Each handler
// applies one operation and returns the `Effects` the processor must
// carry out: catch-up deliveries first, then upstream calls.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use super::activation::ActivationCounter;
use super::cache::DataItemCache;
use super::index::AssociationIndex;
use crate::config::CachePolicy;
use crate::gateway::CacheGate;
use crate::model::{DataItem, DataItemId, ObserverHandle};

/// A batch of values bound for one observer.
#[derive(Debug)]
pub struct Delivery {
    pub observer: ObserverHandle,
    pub values: Vec<DataItem>,
}

/// Side effects of one command, in the order they must be applied.
#[derive(Debug, Default)]
pub struct Effects {
    pub deliveries: Vec<Delivery>,
    pub subscribe: Vec<DataItemId>,
    pub unsubscribe: Vec<DataItemId>,
    pub request_data: Vec<DataItemId>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
            && self.subscribe.is_empty()
            && self.unsubscribe.is_empty()
            && self.request_data.is_empty()
    }
}

/// Point-in-time copy of the hub's bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct HubSnapshot {
    pub item_observers: HashMap<DataItemId, HashSet<ObserverHandle>>,
    pub observer_items: HashMap<ObserverHandle, HashSet<DataItemId>>,
    pub cached: BTreeMap<DataItemId, DataItem>,
    pub active: BTreeMap<DataItemId, u32>,
}

impl HubSnapshot {
    /// Items `observer` is currently subscribed to.
    pub fn items_of(&self, observer: &ObserverHandle) -> BTreeSet<DataItemId> {
        self.observer_items
            .get(observer)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of observers subscribed to `id`.
    pub fn observer_count(&self, id: DataItemId) -> usize {
        self.item_observers.get(&id).map_or(0, HashSet::len)
    }

    /// Every item with at least one observer.
    pub fn subscribed_items(&self) -> BTreeSet<DataItemId> {
        self.item_observers.keys().copied().collect()
    }

    /// `true` when both indices mirror each other and hold no empty sets.
    pub fn is_symmetric(&self) -> bool {
        let no_empty = self.item_observers.values().all(|s| !s.is_empty())
            && self.observer_items.values().all(|s| !s.is_empty());

        let forward = self.item_observers.iter().all(|(id, observers)| {
            observers
                .iter()
                .all(|o| self.observer_items.get(o).is_some_and(|items| items.contains(id)))
        });
        let backward = self.observer_items.iter().all(|(o, items)| {
            items
                .iter()
                .all(|id| self.item_observers.get(id).is_some_and(|obs| obs.contains(o)))
        });

        no_empty && forward && backward
    }
}

fn sorted(ids: impl IntoIterator<Item = DataItemId>) -> Vec<DataItemId> {
    let mut ids: Vec<DataItemId> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Bookkeeping owned by the command processor.
pub struct HubState {
    item_observers: AssociationIndex<DataItemId, ObserverHandle>,
    observer_items: AssociationIndex<ObserverHandle, DataItemId>,
    cache: DataItemCache,
    activations: ActivationCounter,
    cache_policy: CachePolicy,
}

impl HubState {
    pub fn new(gate: Arc<dyn CacheGate>, cache_policy: CachePolicy) -> Self {
        Self {
            item_observers: AssociationIndex::new(),
            observer_items: AssociationIndex::new(),
            cache: DataItemCache::new(gate),
            activations: ActivationCounter::new(),
            cache_policy,
        }
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Add `observer` to `ids`, serve what is cached, and forward either a
    /// data request for all of `ids` or a subscribe for the ids nobody
    /// watched before.
    pub fn subscribe(
        &mut self,
        ids: &HashSet<DataItemId>,
        observer: &ObserverHandle,
        request_fresh: bool,
    ) -> Effects {
        let observers = HashSet::from([observer.clone()]);
        let created = self.item_observers.add(ids.iter().copied(), &observers);
        self.observer_items.add([observer.clone()], ids);

        let mut effects = Effects::default();
        effects.deliveries.extend(self.serve_cached(ids, observer));
        if request_fresh {
            effects.request_data = sorted(ids.iter().copied());
        } else {
            effects.subscribe = sorted(created);
        }
        effects
    }

    /// Make `ids` the complete interest set of `observer`.
    pub fn update_subscription(
        &mut self,
        ids: &HashSet<DataItemId>,
        observer: &ObserverHandle,
    ) -> Effects {
        let observers = HashSet::from([observer.clone()]);
        let dropped = self.observer_items.update(observer.clone(), ids.clone());
        let unsubscribe = self.item_observers.trim_or_remove(&dropped, &observers).removed_keys;
        let created = self.item_observers.add(ids.iter().copied(), &observers);

        let mut effects = Effects::default();
        effects.deliveries.extend(self.serve_cached(ids, observer));
        effects.subscribe = sorted(created);
        effects.unsubscribe = self.release_unobserved(unsubscribe);
        effects
    }

    /// Remove `observer` from `ids`; items left without observers are
    /// unsubscribed upstream.
    pub fn unsubscribe(&mut self, ids: &HashSet<DataItemId>, observer: &ObserverHandle) -> Effects {
        let unused = self
            .observer_items
            .trim_or_remove([observer], ids)
            .trimmed_values;
        let observers = HashSet::from([observer.clone()]);
        let emptied = self.item_observers.trim_or_remove(&unused, &observers).removed_keys;

        Effects {
            unsubscribe: self.release_unobserved(emptied),
            ..Effects::default()
        }
    }

    /// Forget `observer` entirely.
    pub fn unsubscribe_all(&mut self, observer: &ObserverHandle) -> Effects {
        let items = self.observer_items.remove(observer);
        if items.is_empty() {
            return Effects::default();
        }
        let observers = HashSet::from([observer.clone()]);
        let emptied = self.item_observers.trim_or_remove(&items, &observers).removed_keys;

        Effects {
            unsubscribe: self.release_unobserved(emptied),
            ..Effects::default()
        }
    }

    /// Upstream calls that re-establish the current interest set on a
    /// newly attached gateway.
    pub fn gateway_attached(&self, request_data: bool) -> Effects {
        let ids = sorted(self.item_observers.keys());
        Effects {
            request_data: if request_data { ids.clone() } else { Vec::new() },
            subscribe: ids,
            ..Effects::default()
        }
    }

    // ── Value propagation ────────────────────────────────────────────

    /// Cache `batch` and deliver every accepted value to the observers
    /// that want it. The batch is consumed.
    pub fn notify(&mut self, batch: Vec<DataItem>) -> Effects {
        let accepted: HashSet<DataItemId> = batch
            .iter()
            .filter(|item| self.cache.accept(item))
            .map(DataItem::id)
            .collect();
        drop(batch);

        let interested: HashSet<&ObserverHandle> = accepted
            .iter()
            .filter_map(|id| self.item_observers.get(id))
            .flatten()
            .collect();

        let mut effects = Effects::default();
        for observer in interested {
            let wanted: HashSet<DataItemId> = self
                .observer_items
                .get(observer)
                .map(|items| items.intersection(&accepted).copied().collect())
                .unwrap_or_default();
            effects.deliveries.extend(self.serve_cached(&wanted, observer));
        }
        effects
    }

    // ── Activation ───────────────────────────────────────────────────

    /// Returns `true` when an upstream "turn on" must be sent.
    pub fn turn_on(&mut self, id: DataItemId) -> bool {
        let first = self.activations.acquire(id);
        debug!(item = %id, refs = self.activations.count(id), "turn on");
        first
    }

    /// Returns `true` when an upstream "turn off" must be sent.
    pub fn turn_off(&mut self, id: DataItemId) -> bool {
        let last = self.activations.release(id);
        debug!(item = %id, refs = self.activations.count(id), "turn off");
        last
    }

    // ── Introspection ────────────────────────────────────────────────

    pub fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            item_observers: self
                .item_observers
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            observer_items: self
                .observer_items
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            cached: self.cache.iter().map(|v| (v.id(), v.clone())).collect(),
            active: self.activations.iter().collect(),
        }
    }

    /// Drop every index entry, cached value and activation count.
    pub fn clear(&mut self) {
        self.item_observers.clear();
        self.observer_items.clear();
        self.cache.clear();
        self.activations.clear();
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn serve_cached(&self, ids: &HashSet<DataItemId>, observer: &ObserverHandle) -> Option<Delivery> {
        let values = self.cache.lookup(ids);
        if values.is_empty() {
            return None;
        }
        Some(Delivery {
            observer: observer.clone(),
            values,
        })
    }

    /// Sort the ids that lost their last observer and apply the cache policy.
    fn release_unobserved(&mut self, ids: HashSet<DataItemId>) -> Vec<DataItemId> {
        let ids = sorted(ids);
        if self.cache_policy == CachePolicy::EvictUnobserved {
            for id in &ids {
                if self.cache.evict(*id) {
                    debug!(item = %id, "evicted unobserved item");
                }
            }
        }
        ids
    }
}
