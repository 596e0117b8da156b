// ── Collaborator contracts ──
//
// Everything the hub talks to but does not implement: the upstream
// subscription source, the upstream action channel, the factory that
// turns raw source items into values, and the gate that decides what is
// worth caching. All calls are synchronous and in-process.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::HubConfig;
use crate::hub::ObserverHub;
use crate::model::{DataItem, DataItemId, RawDataItem};

/// Upstream source of data item values.
///
/// Every call carries the requesting hub so the gateway can push values
/// back through [`ObserverHub::notify`].
pub trait SubscriptionGateway: Send + Sync {
    fn subscribe(&self, ids: &[DataItemId], hub: &ObserverHub);
    fn unsubscribe(&self, ids: &[DataItemId], hub: &ObserverHub);
    fn request_data(&self, ids: &[DataItemId], hub: &ObserverHub);
}

/// Upstream activation and backhaul control.
///
/// `timeout` is passed through untouched; its meaning belongs to the
/// implementation.
pub trait ActionGateway: Send + Sync {
    fn turn_on(&self, id: DataItemId, timeout: Duration);
    fn turn_off(&self, id: DataItemId);
    fn connect_backhaul(&self, client: &str);
    fn disconnect_backhaul(&self, client: &str);
}

/// Builds owned values from source items. `None` refuses the item.
pub trait ValueFactory: Send + Sync {
    fn create_from(&self, source: &RawDataItem) -> Option<DataItem>;
}

/// Decides whether a value should be recorded in the cache.
pub trait CacheGate: Send + Sync {
    fn should_accept(&self, value: &DataItem) -> bool;
}

impl<F> CacheGate for F
where
    F: Fn(&DataItem) -> bool + Send + Sync,
{
    fn should_accept(&self, value: &DataItem) -> bool {
        self(value)
    }
}

// ── Default collaborators ───────────────────────────────────────────

/// Gate that records every value.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl CacheGate for AcceptAll {
    fn should_accept(&self, _value: &DataItem) -> bool {
        true
    }
}

/// Factory for JSON-object payloads.
///
/// Each top-level key of the payload becomes a field. Non-object payloads
/// are refused, as are ids outside the optional allow-list.
#[derive(Debug, Clone, Default)]
pub struct FieldMapFactory {
    supported: Option<HashSet<DataItemId>>,
}

impl FieldMapFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the factory to the given ids.
    pub fn with_supported<I: IntoIterator<Item = DataItemId>>(ids: I) -> Self {
        Self {
            supported: Some(ids.into_iter().collect()),
        }
    }

    fn supports(&self, id: DataItemId) -> bool {
        self.supported.as_ref().is_none_or(|s| s.contains(&id))
    }
}

impl ValueFactory for FieldMapFactory {
    fn create_from(&self, source: &RawDataItem) -> Option<DataItem> {
        if !self.supports(source.id) {
            debug!(item = %source.id, "factory: unsupported data item");
            return None;
        }
        let serde_json::Value::Object(map) = &source.payload else {
            debug!(item = %source.id, "factory: payload is not an object");
            return None;
        };
        let mut item = DataItem::new(source.id);
        for (name, value) in map {
            item.set_field(name.clone(), value.clone());
        }
        Some(item)
    }
}

// ── HubContext ──────────────────────────────────────────────────────

/// Collaborators injected into an [`ObserverHub`] at construction.
///
/// Gateways may also be attached later through the hub itself.
#[derive(Clone)]
pub struct HubContext {
    pub(crate) factory: Arc<dyn ValueFactory>,
    pub(crate) gate: Arc<dyn CacheGate>,
    pub(crate) subscription_gateway: Option<Arc<dyn SubscriptionGateway>>,
    pub(crate) action_gateway: Option<Arc<dyn ActionGateway>>,
}

impl HubContext {
    pub fn new(factory: Arc<dyn ValueFactory>, gate: Arc<dyn CacheGate>) -> Self {
        Self {
            factory,
            gate,
            subscription_gateway: None,
            action_gateway: None,
        }
    }

    /// Default collaborators, with the factory restricted to
    /// `config.supported_items` when set.
    pub fn for_config(config: &HubConfig) -> Self {
        let factory = match &config.supported_items {
            Some(ids) => FieldMapFactory::with_supported(ids.iter().copied()),
            None => FieldMapFactory::new(),
        };
        Self::new(Arc::new(factory), Arc::new(AcceptAll))
    }

    pub fn with_subscription_gateway(mut self, gateway: Arc<dyn SubscriptionGateway>) -> Self {
        self.subscription_gateway = Some(gateway);
        self
    }

    pub fn with_action_gateway(mut self, gateway: Arc<dyn ActionGateway>) -> Self {
        self.action_gateway = Some(gateway);
        self
    }
}

impl Default for HubContext {
    fn default() -> Self {
        Self::new(Arc::new(FieldMapFactory::new()), Arc::new(AcceptAll))
    }
}

impl fmt::Debug for HubContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubContext")
            .field("subscription_gateway", &self.subscription_gateway.is_some())
            .field("action_gateway", &self.action_gateway.is_some())
            .finish_non_exhaustive()
    }
}
