// ── Hub runtime configuration ──
//
// Plain data describing how a hub behaves. Nothing here reads files;
// `statushub-config` builds a `HubConfig` and hands it in.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::DataItemId;

/// What happens to a cached value once no observer wants the item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Keep every value for the lifetime of the hub.
    #[default]
    RetainAll,
    /// Drop the value when the item's last observer goes away.
    EvictUnobserved,
}

/// Configuration for a single [`ObserverHub`](crate::ObserverHub).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Display name of the hub, used in logs.
    pub name: String,
    pub cache_policy: CachePolicy,
    /// Also issue `request_data` for the whole interest set when a
    /// subscription gateway is attached.
    pub request_data_on_attach: bool,
    /// Allow-list for the default value factory. `None` accepts all ids.
    pub supported_items: Option<BTreeSet<DataItemId>>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            name: "statushub".into(),
            cache_policy: CachePolicy::default(),
            request_data_on_attach: true,
            supported_items: None,
        }
    }
}
