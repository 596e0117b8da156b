// ── Activation reference counts ──
//
// Tracks how many callers currently want each data item turned on
// upstream. Only the first acquire and the last release are forwarded.

use std::collections::HashMap;
use std::num::NonZeroU32;

use tracing::warn;

use crate::model::DataItemId;

/// Per-item activation reference counts. Absent means inactive.
#[derive(Debug, Default)]
pub struct ActivationCounter {
    counts: HashMap<DataItemId, NonZeroU32>,
}

impl ActivationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference on `id`. Returns `true` when the item was inactive,
    /// i.e. an upstream "turn on" must be sent.
    ///
    /// A reference past `u32::MAX` is refused and the count is left as is.
    pub fn acquire(&mut self, id: DataItemId) -> bool {
        match self.counts.get_mut(&id) {
            Some(count) => {
                match count.checked_add(1) {
                    Some(next) => *count = next,
                    None => warn!(item = %id, "activation count at limit; reference refused"),
                }
                false
            }
            None => {
                self.counts.insert(id, NonZeroU32::MIN);
                true
            }
        }
    }

    /// Drop a reference on `id`. Returns `true` when this was the last
    /// reference, i.e. an upstream "turn off" must be sent. Releasing an
    /// inactive item does nothing.
    pub fn release(&mut self, id: DataItemId) -> bool {
        let Some(count) = self.counts.get_mut(&id) else {
            return false;
        };
        match NonZeroU32::new(count.get() - 1) {
            Some(remaining) => {
                *count = remaining;
                false
            }
            None => {
                self.counts.remove(&id);
                true
            }
        }
    }

    pub fn count(&self, id: DataItemId) -> u32 {
        self.counts.get(&id).map_or(0, |c| c.get())
    }

    pub fn iter(&self) -> impl Iterator<Item = (DataItemId, u32)> + '_ {
        self.counts.iter().map(|(id, c)| (*id, c.get()))
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_acquire_and_last_release_transition() {
        let mut counter = ActivationCounter::new();
        let id = DataItemId::WIFI_HARDWARE_STATE;

        assert!(counter.acquire(id));
        assert!(!counter.acquire(id));
        assert_eq!(counter.count(id), 2);

        assert!(!counter.release(id));
        assert_eq!(counter.count(id), 1);
        assert!(counter.release(id));
        assert_eq!(counter.count(id), 0);
    }

    #[test]
    fn acquire_at_limit_is_refused() {
        let mut counter = ActivationCounter::new();
        let id = DataItemId::BT_SCAN;
        counter.counts.insert(id, NonZeroU32::MAX);

        assert!(!counter.acquire(id));
        assert_eq!(counter.count(id), u32::MAX);
        assert!(!counter.release(id));
        assert_eq!(counter.count(id), u32::MAX - 1);
    }

    #[test]
    fn release_of_inactive_item_is_ignored() {
        let mut counter = ActivationCounter::new();
        assert!(!counter.release(DataItemId::BT_SCAN));
        assert_eq!(counter.iter().count(), 0);
    }
}
