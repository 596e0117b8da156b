// ── Observer identity ──
//
// Observers are identified by handle, not by value: two observers with
// the same name are still distinct subscribers.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::data_item::DataItem;

/// A consumer of data item updates.
///
/// `notify` is called from the hub's worker task, so implementations
/// should hand the batch off quickly rather than block.
pub trait Observer: Send + Sync {
    /// Display name, used for logging only.
    fn name(&self) -> &str;

    /// Receive a batch of value snapshots.
    fn notify(&self, values: Vec<DataItem>);
}

/// Shared handle to an [`Observer`] with pointer identity.
#[derive(Clone)]
pub struct ObserverHandle(Arc<dyn Observer>);

impl ObserverHandle {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self(observer)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn notify(&self, values: Vec<DataItem>) {
        self.0.notify(values);
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0).cast::<()>()
    }
}

impl<O: Observer + 'static> From<Arc<O>> for ObserverHandle {
    fn from(observer: Arc<O>) -> Self {
        Self(observer)
    }
}

impl PartialEq for ObserverHandle {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.addr(), other.addr())
    }
}

impl Eq for ObserverHandle {}

impl Hash for ObserverHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObserverHandle")
            .field(&self.name())
            .field(&self.addr())
            .finish()
    }
}
