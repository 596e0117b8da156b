// statushub-core: Subscription index, value cache and command queue
// between system status sources and their observers.

mod command;
pub mod config;
pub mod error;
pub mod gateway;
pub mod hub;
pub mod model;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{CachePolicy, HubConfig};
pub use error::HubError;
pub use gateway::{
    AcceptAll, ActionGateway, CacheGate, FieldMapFactory, HubContext, SubscriptionGateway,
    ValueFactory,
};
pub use hub::ObserverHub;
pub use store::HubSnapshot;
pub use stream::{ChannelObserver, ObserverBatchStream, ObserverStream};

pub use model::{DataItem, DataItemId, Observer, ObserverHandle, ParseDataItemIdError, RawDataItem};
