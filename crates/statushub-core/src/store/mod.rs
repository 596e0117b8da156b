// ── Hub bookkeeping ──
//
// Association indices, the latest-value cache and activation counts,
// aggregated into `HubState` which the command processor owns.

mod activation;
mod cache;
mod index;
mod state;

pub use activation::ActivationCounter;
pub use cache::DataItemCache;
pub use index::{AssociationIndex, TrimOutcome};
pub use state::{Delivery, Effects, HubSnapshot, HubState};
