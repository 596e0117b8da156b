// ── Domain model ──
//
// Identifiers, value snapshots, and observer handles shared by every
// other module.

pub mod data_item;
pub mod observer;

pub use data_item::{DataItem, DataItemId, ParseDataItemIdError, RawDataItem};
pub use observer::{Observer, ObserverHandle};
