// ── Observer hub ──
//
// Public facade over the command queue. Entry points validate their
// arguments on the caller's thread, capture the request as a `Command`
// and return immediately; a single spawned worker applies commands in
// submission order and is the only code that touches `HubState`.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashSet;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::command::Command;
use crate::config::HubConfig;
use crate::error::HubError;
use crate::gateway::{ActionGateway, CacheGate, HubContext, SubscriptionGateway, ValueFactory};
use crate::model::{DataItem, DataItemId, ObserverHandle, RawDataItem};
use crate::store::{Effects, HubSnapshot, HubState};

/// Subscription and distribution hub for data items.
///
/// Cheaply cloneable via `Arc<HubInner>`. Create with [`new()`](Self::new),
/// call [`start()`](Self::start) to spawn the worker, and
/// [`shutdown()`](Self::shutdown) to stop it. Commands submitted before
/// `start()` are kept and run in order once the worker is up.
#[derive(Clone)]
pub struct ObserverHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    config: HubConfig,
    factory: Arc<dyn ValueFactory>,
    gate: Arc<dyn CacheGate>,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    /// Read synchronously by activation and backhaul calls.
    action_gateway: ArcSwapOption<Arc<dyn ActionGateway>>,
    /// Backhaul clients that asked before an action gateway existed.
    pending_backhaul: DashSet<String>,
    cancel: CancellationToken,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ObserverHub {
    /// Create a hub. Does NOT spawn the worker -- call [`start()`](Self::start).
    pub fn new(config: HubConfig, context: HubContext) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let HubContext {
            factory,
            gate,
            subscription_gateway,
            action_gateway,
        } = context;

        let hub = Self {
            inner: Arc::new(HubInner {
                config,
                factory,
                gate,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                action_gateway: ArcSwapOption::from_pointee(action_gateway),
                pending_backhaul: DashSet::new(),
                cancel: CancellationToken::new(),
                task_handle: Mutex::new(None),
            }),
        };

        if let Some(gateway) = subscription_gateway {
            hub.set_subscription_gateway(gateway);
        }
        hub
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the command processor. Must be called from within a Tokio runtime.
    pub async fn start(&self) -> Result<(), HubError> {
        let Some(rx) = self.inner.command_rx.lock().await.take() else {
            return Err(HubError::AlreadyStarted {
                name: self.name().to_owned(),
            });
        };

        let state = HubState::new(Arc::clone(&self.inner.gate), self.inner.config.cache_policy);
        let worker = Worker {
            hub: Arc::downgrade(&self.inner),
            name: self.name().to_owned(),
            request_data_on_attach: self.inner.config.request_data_on_attach,
            state,
            gateway: None,
        };
        let cancel = self.inner.cancel.clone();
        let handle = tokio::spawn(command_processor_task(worker, rx, cancel));
        *self.inner.task_handle.lock().await = Some(handle);

        info!(hub = %self.name(), "observer hub started");
        Ok(())
    }

    /// Stop the worker and release all bookkeeping.
    ///
    /// Commands still queued are discarded. The hub cannot be restarted.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let handle = self.inner.task_handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(hub = %self.name(), error = %e, "command processor ended abnormally");
            }
        }
        // Never started: drop the receiver so later submissions fail fast.
        drop(self.inner.command_rx.lock().await.take());

        self.inner.pending_backhaul.clear();
        info!(hub = %self.name(), "observer hub stopped");
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Register `observer` for `ids`.
    ///
    /// Cached values for `ids` are delivered right away. With
    /// `request_fresh` the upstream gateway is asked for fresh data on all
    /// of `ids`; otherwise only ids nobody was subscribed to are forwarded.
    pub fn subscribe(&self, ids: &[DataItemId], observer: &ObserverHandle, request_fresh: bool) {
        let Some(ids) = validate("subscribe", ids, observer) else {
            return;
        };
        self.submit(Command::Subscribe {
            ids,
            observer: observer.clone(),
            request_fresh,
        });
    }

    /// Replace the complete interest set of `observer` with `ids`.
    pub fn update_subscription(&self, ids: &[DataItemId], observer: &ObserverHandle) {
        let Some(ids) = validate("update_subscription", ids, observer) else {
            return;
        };
        self.submit(Command::UpdateSubscription {
            ids,
            observer: observer.clone(),
        });
    }

    /// Remove `observer` from `ids`.
    pub fn unsubscribe(&self, ids: &[DataItemId], observer: &ObserverHandle) {
        let Some(ids) = validate("unsubscribe", ids, observer) else {
            return;
        };
        self.submit(Command::Unsubscribe {
            ids,
            observer: observer.clone(),
        });
    }

    /// Remove `observer` from everything it is subscribed to.
    pub fn unsubscribe_all(&self, observer: &ObserverHandle) {
        self.submit(Command::UnsubscribeAll {
            observer: observer.clone(),
        });
    }

    // ── Values ───────────────────────────────────────────────────────

    /// Accept values from the upstream source.
    ///
    /// Each item is turned into an owned value by the factory; refused
    /// items are logged and skipped. Nothing is queued if none survive.
    pub fn notify(&self, incoming: &[RawDataItem]) {
        let batch: Vec<DataItem> = incoming
            .iter()
            .filter_map(|raw| {
                let created = self.inner.factory.create_from(raw);
                match &created {
                    Some(value) => debug!(value = %value.stringify(), "notify: data item in"),
                    None => warn!(item = %raw.id, "unable to create data item"),
                }
                created
            })
            .collect();

        if batch.is_empty() {
            return;
        }
        self.submit(Command::Notify { batch });
    }

    // ── Upstream gateways ────────────────────────────────────────────

    /// Attach the upstream subscription gateway.
    ///
    /// Applied on the worker: if any item currently has observers, the
    /// gateway immediately receives `subscribe` (and, when configured,
    /// `request_data`) for the whole interest set.
    pub fn set_subscription_gateway(&self, gateway: Arc<dyn SubscriptionGateway>) {
        self.submit(Command::SetSubscriptionGateway { gateway });
    }

    /// Attach the upstream action gateway. Pending backhaul requests are
    /// not replayed; see [`replay_pending_backhaul`](Self::replay_pending_backhaul).
    pub fn set_action_gateway(&self, gateway: Arc<dyn ActionGateway>) {
        self.inner.action_gateway.store(Some(Arc::new(gateway)));
        info!(hub = %self.name(), "action gateway attached");
    }

    fn action_gateway(&self) -> Option<Arc<dyn ActionGateway>> {
        self.inner.action_gateway.load().as_deref().cloned()
    }

    // ── Activation ───────────────────────────────────────────────────

    /// Take an activation reference on `id`. Only the first reference
    /// sends an upstream "turn on".
    pub fn turn_on(&self, id: DataItemId, timeout: Duration) {
        let Some(gateway) = self.action_gateway() else {
            warn!(item = %id, "turn_on: no action gateway configured");
            return;
        };
        self.submit(Command::TurnOn {
            gateway,
            id,
            timeout,
        });
    }

    /// Drop an activation reference on `id`. Only the last reference
    /// sends an upstream "turn off".
    pub fn turn_off(&self, id: DataItemId) {
        let Some(gateway) = self.action_gateway() else {
            warn!(item = %id, "turn_off: no action gateway configured");
            return;
        };
        self.submit(Command::TurnOff { gateway, id });
    }

    // ── Backhaul ─────────────────────────────────────────────────────

    /// Ask upstream to connect the backhaul channel for `client`.
    ///
    /// Without an action gateway the request is recorded as pending and
    /// [`HubError::ActionGatewayUnavailable`] is returned.
    pub fn connect_backhaul(&self, client: &str) -> Result<(), HubError> {
        if let Some(gateway) = self.action_gateway() {
            self.submit(Command::ConnectBackhaul {
                gateway,
                client: client.to_owned(),
            });
            return Ok(());
        }

        warn!(client, "no action gateway; caching backhaul connect request");
        if self.inner.pending_backhaul.insert(client.to_owned()) {
            debug!(client, "added to pending backhaul requests");
        }
        Err(HubError::ActionGatewayUnavailable {
            client: client.to_owned(),
        })
    }

    /// Ask upstream to disconnect the backhaul channel for `client`.
    ///
    /// Without an action gateway any pending connect request for `client`
    /// is withdrawn and [`HubError::ActionGatewayUnavailable`] is returned.
    pub fn disconnect_backhaul(&self, client: &str) -> Result<(), HubError> {
        if let Some(gateway) = self.action_gateway() {
            self.submit(Command::DisconnectBackhaul {
                gateway,
                client: client.to_owned(),
            });
            return Ok(());
        }

        warn!(client, "no action gateway; dropping cached backhaul request");
        if self.inner.pending_backhaul.remove(client).is_some() {
            debug!(client, "removed from pending backhaul requests");
        }
        Err(HubError::ActionGatewayUnavailable {
            client: client.to_owned(),
        })
    }

    /// Clients whose backhaul connect request is waiting for a gateway.
    pub fn pending_backhaul_requests(&self) -> BTreeSet<String> {
        self.inner
            .pending_backhaul
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Forward every pending backhaul connect request to the current
    /// action gateway. Returns how many were forwarded; zero when no
    /// gateway is configured (the requests stay pending).
    pub fn replay_pending_backhaul(&self) -> usize {
        let Some(gateway) = self.action_gateway() else {
            return 0;
        };

        let mut clients: Vec<String> = self.pending_backhaul_requests().into_iter().collect();
        clients.retain(|client| self.inner.pending_backhaul.remove(client).is_some());
        for client in &clients {
            self.submit(Command::ConnectBackhaul {
                gateway: Arc::clone(&gateway),
                client: client.clone(),
            });
        }
        if !clients.is_empty() {
            info!(count = clients.len(), "replayed pending backhaul requests");
        }
        clients.len()
    }

    // ── Synchronization ──────────────────────────────────────────────

    /// Wait until every command submitted before this call has run.
    ///
    /// Does not complete before [`start()`](Self::start) has been called.
    pub async fn flush(&self) -> Result<(), HubError> {
        let (done, rx) = oneshot::channel();
        self.submit(Command::Flush { done });
        rx.await.map_err(|_| HubError::Stopped)
    }

    /// Snapshot of the hub's bookkeeping, taken after every previously
    /// submitted command has run.
    pub async fn inspect(&self) -> Result<HubSnapshot, HubError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Inspect { reply });
        rx.await.map_err(|_| HubError::Stopped)
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn submit(&self, command: Command) {
        let kind = command.kind();
        if self.inner.command_tx.send(command).is_err() {
            debug!(hub = %self.name(), command = kind, "hub stopped; command dropped");
        } else {
            trace!(command = kind, "command queued");
        }
    }
}

// ── Command processor ────────────────────────────────────────────────

/// Owner of all mutable hub state while the worker runs.
///
/// Holds the hub weakly so the command channel closes, and the worker
/// exits, once the last `ObserverHub` handle is dropped.
struct Worker {
    hub: Weak<HubInner>,
    name: String,
    request_data_on_attach: bool,
    state: HubState,
    gateway: Option<Arc<dyn SubscriptionGateway>>,
}

impl Worker {
    fn handle(&mut self, command: Command) {
        trace!(command = command.kind(), "processing command");
        match command {
            Command::Subscribe {
                ids,
                observer,
                request_fresh,
            } => {
                let effects = self.state.subscribe(&ids, &observer, request_fresh);
                self.apply(effects);
            }
            Command::UpdateSubscription { ids, observer } => {
                let effects = self.state.update_subscription(&ids, &observer);
                self.apply(effects);
            }
            Command::Unsubscribe { ids, observer } => {
                let effects = self.state.unsubscribe(&ids, &observer);
                self.apply(effects);
            }
            Command::UnsubscribeAll { observer } => {
                let effects = self.state.unsubscribe_all(&observer);
                self.apply(effects);
            }
            Command::Notify { batch } => {
                let effects = self.state.notify(batch);
                self.apply(effects);
            }
            Command::SetSubscriptionGateway { gateway } => {
                info!(hub = %self.name, "subscription gateway attached");
                self.gateway = Some(gateway);
                let effects = self.state.gateway_attached(self.request_data_on_attach);
                self.apply(effects);
            }
            Command::TurnOn {
                gateway,
                id,
                timeout,
            } => {
                if self.state.turn_on(id) {
                    debug!(item = %id, ?timeout, "sending turn on request");
                    gateway.turn_on(id, timeout);
                }
            }
            Command::TurnOff { gateway, id } => {
                if self.state.turn_off(id) {
                    debug!(item = %id, "sending turn off request");
                    gateway.turn_off(id);
                }
            }
            Command::ConnectBackhaul { gateway, client } => {
                debug!(client = %client, "forwarding backhaul connect");
                gateway.connect_backhaul(&client);
            }
            Command::DisconnectBackhaul { gateway, client } => {
                debug!(client = %client, "forwarding backhaul disconnect");
                gateway.disconnect_backhaul(&client);
            }
            Command::Flush { done } => {
                let _ = done.send(());
            }
            Command::Inspect { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
        }
    }

    /// Deliver catch-up values, then forward upstream calls.
    fn apply(&self, effects: Effects) {
        let Effects {
            deliveries,
            subscribe,
            unsubscribe,
            request_data,
        } = effects;

        for delivery in deliveries {
            debug!(
                observer = delivery.observer.name(),
                items = %id_list(delivery.values.iter().map(DataItem::id)),
                "delivering data items"
            );
            delivery.observer.notify(delivery.values);
        }

        let Some(gateway) = &self.gateway else {
            if !(subscribe.is_empty() && unsubscribe.is_empty() && request_data.is_empty()) {
                debug!("no subscription gateway; upstream forwarding suppressed");
            }
            return;
        };
        let Some(inner) = self.hub.upgrade() else {
            debug!(hub = %self.name, "hub dropped; upstream forwarding suppressed");
            return;
        };
        let hub = ObserverHub { inner };

        if !subscribe.is_empty() {
            debug!(items = %id_list(subscribe.iter().copied()), "subscribe request sent upstream");
            gateway.subscribe(&subscribe, &hub);
        }
        if !unsubscribe.is_empty() {
            debug!(items = %id_list(unsubscribe.iter().copied()), "unsubscribe request sent upstream");
            gateway.unsubscribe(&unsubscribe, &hub);
        }
        if !request_data.is_empty() {
            debug!(items = %id_list(request_data.iter().copied()), "data request sent upstream");
            gateway.request_data(&request_data, &hub);
        }
    }
}

/// Reject empty id lists; duplicates collapse into a set.
fn validate(
    op: &'static str,
    ids: &[DataItemId],
    observer: &ObserverHandle,
) -> Option<HashSet<DataItemId>> {
    if ids.is_empty() {
        warn!(op, observer = observer.name(), "data item list is empty; ignoring");
        return None;
    }
    Some(ids.iter().copied().collect())
}

fn id_list(ids: impl Iterator<Item = DataItemId>) -> String {
    ids.map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

/// Run commands one at a time until cancelled or every hub handle is
/// gone, then tear the state down.
async fn command_processor_task(
    mut worker: Worker,
    mut rx: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            command = rx.recv() => {
                let Some(command) = command else { break };
                worker.handle(command);
            }
        }
    }

    worker.state.clear();
    worker.gateway = None;
    debug!(hub = %worker.name, "command processor exited");
}
