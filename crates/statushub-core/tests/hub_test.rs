#![allow(clippy::unwrap_used)]
// Integration tests for `ObserverHub` against recording collaborators.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use statushub_core::{
    ActionGateway, CachePolicy, ChannelObserver, DataItem, DataItemId, FieldMapFactory,
    HubConfig, HubContext, HubError, Observer, ObserverHandle, ObserverHub, ObserverStream,
    RawDataItem, SubscriptionGateway,
};

// ── Helpers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Upstream {
    Subscribe(Vec<u16>),
    Unsubscribe(Vec<u16>),
    RequestData(Vec<u16>),
}

#[derive(Default)]
struct RecordingGateway {
    calls: Mutex<Vec<Upstream>>,
    /// Values pushed back through the hub on `request_data`.
    respond_with: Mutex<Vec<RawDataItem>>,
}

impl RecordingGateway {
    fn calls(&self) -> Vec<Upstream> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Upstream) {
        self.calls.lock().unwrap().push(call);
    }
}

fn raw_ids(ids: &[DataItemId]) -> Vec<u16> {
    ids.iter().map(|id| id.raw()).collect()
}

impl SubscriptionGateway for RecordingGateway {
    fn subscribe(&self, ids: &[DataItemId], _hub: &ObserverHub) {
        self.record(Upstream::Subscribe(raw_ids(ids)));
    }

    fn unsubscribe(&self, ids: &[DataItemId], _hub: &ObserverHub) {
        self.record(Upstream::Unsubscribe(raw_ids(ids)));
    }

    fn request_data(&self, ids: &[DataItemId], hub: &ObserverHub) {
        self.record(Upstream::RequestData(raw_ids(ids)));
        let values = self.respond_with.lock().unwrap().clone();
        if !values.is_empty() {
            hub.notify(&values);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    TurnOn(u16, Duration),
    TurnOff(u16),
    Connect(String),
    Disconnect(String),
}

#[derive(Default)]
struct RecordingActions {
    calls: Mutex<Vec<Action>>,
}

impl RecordingActions {
    fn calls(&self) -> Vec<Action> {
        self.calls.lock().unwrap().clone()
    }
}

impl ActionGateway for RecordingActions {
    fn turn_on(&self, id: DataItemId, timeout: Duration) {
        self.calls.lock().unwrap().push(Action::TurnOn(id.raw(), timeout));
    }

    fn turn_off(&self, id: DataItemId) {
        self.calls.lock().unwrap().push(Action::TurnOff(id.raw()));
    }

    fn connect_backhaul(&self, client: &str) {
        self.calls.lock().unwrap().push(Action::Connect(client.into()));
    }

    fn disconnect_backhaul(&self, client: &str) {
        self.calls.lock().unwrap().push(Action::Disconnect(client.into()));
    }
}

fn id(raw: u16) -> DataItemId {
    DataItemId::new(raw)
}

fn raw(n: u16, payload: serde_json::Value) -> RawDataItem {
    RawDataItem::new(id(n), payload)
}

fn ids_of(batch: &[DataItem]) -> Vec<u16> {
    batch.iter().map(|v| v.id().raw()).collect()
}

fn set(ids: &[u16]) -> BTreeSet<DataItemId> {
    ids.iter().copied().map(DataItemId::new).collect()
}

async fn started(config: HubConfig) -> (ObserverHub, Arc<RecordingGateway>) {
    let gateway = Arc::new(RecordingGateway::default());
    let context = HubContext::default().with_subscription_gateway(gateway.clone());
    let hub = ObserverHub::new(config, context);
    hub.start().await.unwrap();
    (hub, gateway)
}

fn observer(name: &str) -> (ObserverHandle, ObserverStream) {
    ChannelObserver::channel(name)
}

// ── Scenario ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_two_observer_scenario() {
    let (hub, gateway) = started(HubConfig::default()).await;
    let (a, mut a_rx) = observer("A");
    let (b, mut b_rx) = observer("B");

    hub.subscribe(&[id(1), id(2)], &a, false);
    hub.flush().await.unwrap();
    assert!(a_rx.try_recv().is_none(), "cache is empty, nothing to serve");
    assert_eq!(gateway.calls(), vec![Upstream::Subscribe(vec![1, 2])]);

    hub.notify(&[raw(1, json!({"v": 1})), raw(2, json!({"v": 2}))]);
    hub.flush().await.unwrap();
    assert_eq!(ids_of(&a_rx.try_recv().unwrap()), vec![1, 2]);

    hub.subscribe(&[id(2), id(3)], &b, false);
    hub.flush().await.unwrap();
    assert_eq!(ids_of(&b_rx.try_recv().unwrap()), vec![2]);
    assert_eq!(gateway.calls().last(), Some(&Upstream::Subscribe(vec![3])));

    hub.unsubscribe(&[id(1)], &a);
    hub.flush().await.unwrap();
    assert_eq!(gateway.calls().last(), Some(&Upstream::Unsubscribe(vec![1])));

    let snapshot = hub.inspect().await.unwrap();
    assert_eq!(snapshot.items_of(&a), set(&[2]));
    assert_eq!(snapshot.items_of(&b), set(&[2, 3]));
    assert!(snapshot.is_symmetric());

    hub.shutdown().await;
}

// ── Subscriptions ───────────────────────────────────────────────────

#[tokio::test]
async fn test_repeat_subscribe_is_not_forwarded() {
    let (hub, gateway) = started(HubConfig::default()).await;
    let (a, _a_rx) = observer("A");
    let (b, _b_rx) = observer("B");

    hub.subscribe(&[id(5)], &a, false);
    hub.subscribe(&[id(5)], &a, false);
    hub.subscribe(&[id(5)], &b, false);
    hub.flush().await.unwrap();

    assert_eq!(gateway.calls(), vec![Upstream::Subscribe(vec![5])]);
    assert_eq!(hub.inspect().await.unwrap().observer_count(id(5)), 2);
}

#[tokio::test]
async fn test_request_fresh_asks_for_every_id() {
    let (hub, gateway) = started(HubConfig::default()).await;
    let (a, _a_rx) = observer("A");
    let (b, _b_rx) = observer("B");

    hub.subscribe(&[id(1)], &a, false);
    hub.subscribe(&[id(1), id(2)], &b, true);
    hub.flush().await.unwrap();

    assert_eq!(
        gateway.calls(),
        vec![Upstream::Subscribe(vec![1]), Upstream::RequestData(vec![1, 2])]
    );
}

#[tokio::test]
async fn test_update_replaces_interest_set() {
    let (hub, gateway) = started(HubConfig::default()).await;
    let (a, _a_rx) = observer("A");
    let (b, _b_rx) = observer("B");

    hub.subscribe(&[id(1), id(2)], &a, false);
    hub.subscribe(&[id(3)], &b, false);
    hub.flush().await.unwrap();

    hub.update_subscription(&[id(2), id(3)], &a);
    let snapshot = hub.inspect().await.unwrap();

    assert_eq!(snapshot.items_of(&a), set(&[2, 3]));
    assert_eq!(snapshot.subscribed_items(), set(&[2, 3]));
    assert!(snapshot.is_symmetric());
    // 3 was already watched by B, so only the unsubscribe of 1 goes out.
    assert_eq!(
        gateway.calls(),
        vec![
            Upstream::Subscribe(vec![1, 2]),
            Upstream::Subscribe(vec![3]),
            Upstream::Unsubscribe(vec![1]),
        ]
    );
}

#[tokio::test]
async fn test_unsubscribe_keeps_items_other_observers_want() {
    let (hub, gateway) = started(HubConfig::default()).await;
    let (a, _a_rx) = observer("A");
    let (b, _b_rx) = observer("B");

    hub.subscribe(&[id(1), id(2)], &a, false);
    hub.subscribe(&[id(2)], &b, false);
    hub.unsubscribe_all(&a);
    let snapshot = hub.inspect().await.unwrap();

    assert_eq!(snapshot.items_of(&a), BTreeSet::new());
    assert_eq!(snapshot.subscribed_items(), set(&[2]));
    assert_eq!(gateway.calls().last(), Some(&Upstream::Unsubscribe(vec![1])));
}

#[tokio::test]
async fn test_empty_id_list_is_ignored() {
    let (hub, gateway) = started(HubConfig::default()).await;
    let (a, _a_rx) = observer("A");

    hub.subscribe(&[], &a, true);
    hub.update_subscription(&[], &a);
    hub.unsubscribe(&[], &a);
    let snapshot = hub.inspect().await.unwrap();

    assert!(gateway.calls().is_empty());
    assert_eq!(snapshot.observer_items.len(), 0);
}

#[tokio::test]
async fn test_symmetry_after_mixed_operations() {
    let (hub, _gateway) = started(HubConfig::default()).await;
    let observers: Vec<_> = (0..4).map(|n| observer(&format!("o{n}"))).collect();

    for (n, (handle, _)) in observers.iter().enumerate() {
        let n = u16::try_from(n).unwrap();
        hub.subscribe(&[id(n), id(n + 1), id(n + 2)], handle, n % 2 == 0);
    }
    hub.update_subscription(&[id(9)], &observers[0].0);
    hub.unsubscribe(&[id(2), id(3)], &observers[1].0);
    hub.unsubscribe_all(&observers[2].0);

    let snapshot = hub.inspect().await.unwrap();
    assert!(snapshot.is_symmetric());
    assert_eq!(snapshot.items_of(&observers[0].0), set(&[9]));
    assert_eq!(snapshot.items_of(&observers[1].0), set(&[1]));
    assert_eq!(snapshot.items_of(&observers[2].0), BTreeSet::new());
    assert_eq!(snapshot.items_of(&observers[3].0), set(&[3, 4, 5]));
}

// ── Values ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_partial_updates_merge_in_cache() {
    let (hub, _gateway) = started(HubConfig::default()).await;
    let (a, mut a_rx) = observer("A");

    hub.subscribe(&[id(7)], &a, false);
    hub.notify(&[raw(7, json!({"a": 1}))]);
    hub.notify(&[raw(7, json!({"b": 2}))]);
    let snapshot = hub.inspect().await.unwrap();

    let cached = &snapshot.cached[&id(7)];
    assert_eq!(cached.field("a"), Some(&json!(1)));
    assert_eq!(cached.field("b"), Some(&json!(2)));

    // The second delivery carries the merged value, not the partial.
    let batches = a_rx.drain();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1][0].fields().len(), 2);
}

#[tokio::test]
async fn test_notify_delivers_only_wanted_items() {
    let (hub, _gateway) = started(HubConfig::default()).await;
    let (a, mut a_rx) = observer("A");
    let (b, mut b_rx) = observer("B");
    let (c, mut c_rx) = observer("C");

    hub.subscribe(&[id(1)], &a, false);
    hub.subscribe(&[id(1), id(2)], &b, false);
    hub.subscribe(&[id(4)], &c, false);
    hub.notify(&[raw(1, json!({})), raw(2, json!({})), raw(3, json!({}))]);
    hub.flush().await.unwrap();

    assert_eq!(ids_of(&a_rx.try_recv().unwrap()), vec![1]);
    assert_eq!(ids_of(&b_rx.try_recv().unwrap()), vec![1, 2]);
    assert!(c_rx.try_recv().is_none());
    // Unobserved values are still cached.
    assert!(hub.inspect().await.unwrap().cached.contains_key(&id(3)));
}

#[tokio::test]
async fn test_refused_items_are_skipped() {
    let gateway = Arc::new(RecordingGateway::default());
    let context = HubContext::new(
        Arc::new(FieldMapFactory::with_supported([id(1), id(2)])),
        Arc::new(|v: &DataItem| v.id() != DataItemId::new(2)),
    )
    .with_subscription_gateway(gateway);
    let hub = ObserverHub::new(HubConfig::default(), context);
    hub.start().await.unwrap();
    let (a, mut a_rx) = observer("A");

    hub.subscribe(&[id(1), id(2), id(3)], &a, false);
    // 3 is unsupported, 1 is not an object, 2 is rejected by the gate.
    hub.notify(&[raw(3, json!({})), raw(1, json!("flat")), raw(2, json!({}))]);
    hub.notify(&[raw(1, json!({"ok": true}))]);
    let snapshot = hub.inspect().await.unwrap();

    assert_eq!(snapshot.cached.keys().copied().collect::<BTreeSet<_>>(), set(&[1]));
    let batches = a_rx.drain();
    assert_eq!(batches.len(), 1);
    assert_eq!(ids_of(&batches[0]), vec![1]);
}

#[tokio::test]
async fn test_gateway_can_answer_through_hub() {
    let (hub, gateway) = started(HubConfig::default()).await;
    gateway
        .respond_with
        .lock()
        .unwrap()
        .push(raw(4, json!({"fresh": true})));
    let (a, mut a_rx) = observer("A");

    hub.subscribe(&[id(4)], &a, true);
    hub.flush().await.unwrap();
    // The reply was queued behind the first barrier.
    hub.flush().await.unwrap();

    let batch = a_rx.try_recv().unwrap();
    assert_eq!(batch[0].field("fresh"), Some(&json!(true)));
}

#[tokio::test]
async fn test_evict_unobserved_drops_cached_value() {
    let config = HubConfig {
        cache_policy: CachePolicy::EvictUnobserved,
        ..HubConfig::default()
    };
    let (hub, _gateway) = started(config).await;
    let (a, _a_rx) = observer("A");

    hub.subscribe(&[id(1), id(2)], &a, false);
    hub.notify(&[raw(1, json!({})), raw(2, json!({}))]);
    hub.unsubscribe(&[id(1)], &a);
    let snapshot = hub.inspect().await.unwrap();

    assert_eq!(snapshot.cached.keys().copied().collect::<BTreeSet<_>>(), set(&[2]));
}

// ── Gateways ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_late_gateway_receives_interest_set() {
    let hub = ObserverHub::new(HubConfig::default(), HubContext::default());
    hub.start().await.unwrap();
    let (a, _a_rx) = observer("A");

    hub.subscribe(&[id(2), id(1)], &a, false);
    hub.flush().await.unwrap();

    let gateway = Arc::new(RecordingGateway::default());
    hub.set_subscription_gateway(gateway.clone());
    hub.flush().await.unwrap();

    assert_eq!(
        gateway.calls(),
        vec![Upstream::Subscribe(vec![1, 2]), Upstream::RequestData(vec![1, 2])]
    );
}

#[tokio::test]
async fn test_attach_without_request_data() {
    let config = HubConfig {
        request_data_on_attach: false,
        ..HubConfig::default()
    };
    let hub = ObserverHub::new(config, HubContext::default());
    hub.start().await.unwrap();
    let (a, _a_rx) = observer("A");
    hub.subscribe(&[id(1)], &a, false);

    let gateway = Arc::new(RecordingGateway::default());
    hub.set_subscription_gateway(gateway.clone());
    hub.flush().await.unwrap();

    assert_eq!(gateway.calls(), vec![Upstream::Subscribe(vec![1])]);
}

// ── Activation ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_turn_on_off_exact_cancellation() {
    let actions = Arc::new(RecordingActions::default());
    let context = HubContext::default().with_action_gateway(actions.clone());
    let hub = ObserverHub::new(HubConfig::default(), context);
    hub.start().await.unwrap();
    let x = DataItemId::GPS_STATE;
    let timeout = Duration::from_secs(30);

    hub.turn_on(x, timeout);
    hub.turn_on(x, timeout);
    hub.turn_off(x);
    let snapshot = hub.inspect().await.unwrap();
    assert_eq!(snapshot.active.get(&x), Some(&1));
    assert_eq!(actions.calls(), vec![Action::TurnOn(x.raw(), timeout)]);

    hub.turn_off(x);
    let snapshot = hub.inspect().await.unwrap();
    assert!(snapshot.active.is_empty());
    assert_eq!(
        actions.calls(),
        vec![Action::TurnOn(x.raw(), timeout), Action::TurnOff(x.raw())]
    );
}

#[tokio::test]
async fn test_concurrent_turn_on_sends_one_request() {
    let actions = Arc::new(RecordingActions::default());
    let context = HubContext::default().with_action_gateway(actions.clone());
    let hub = ObserverHub::new(HubConfig::default(), context);
    hub.start().await.unwrap();
    let x = DataItemId::WIFI_HARDWARE_STATE;

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let hub = hub.clone();
            std::thread::spawn(move || hub.turn_on(x, Duration::ZERO))
        })
        .collect();
    for task in tasks {
        task.join().unwrap();
    }

    let snapshot = hub.inspect().await.unwrap();
    assert_eq!(snapshot.active.get(&x), Some(&16));
    assert_eq!(actions.calls().len(), 1);
}

#[tokio::test]
async fn test_turn_on_without_action_gateway_is_ignored() {
    let (hub, _gateway) = started(HubConfig::default()).await;

    hub.turn_on(DataItemId::BT_SCAN, Duration::from_secs(1));
    hub.turn_off(DataItemId::BT_SCAN);

    assert!(hub.inspect().await.unwrap().active.is_empty());
}

// ── Backhaul ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_backhaul_forwards_with_gateway() {
    let actions = Arc::new(RecordingActions::default());
    let context = HubContext::default().with_action_gateway(actions.clone());
    let hub = ObserverHub::new(HubConfig::default(), context);
    hub.start().await.unwrap();

    hub.connect_backhaul("xtra").unwrap();
    hub.disconnect_backhaul("xtra").unwrap();
    hub.flush().await.unwrap();

    assert_eq!(
        actions.calls(),
        vec![Action::Connect("xtra".into()), Action::Disconnect("xtra".into())]
    );
    assert!(hub.pending_backhaul_requests().is_empty());
}

#[tokio::test]
async fn test_backhaul_pending_until_replayed() {
    let (hub, _gateway) = started(HubConfig::default()).await;

    let result = hub.connect_backhaul("izat");
    assert!(
        matches!(result, Err(HubError::ActionGatewayUnavailable { ref client }) if client == "izat"),
        "expected ActionGatewayUnavailable, got: {result:?}"
    );
    assert!(hub.connect_backhaul("agps").is_err());
    assert!(hub.connect_backhaul("gone").is_err());
    assert!(hub.disconnect_backhaul("gone").is_err());
    assert_eq!(
        hub.pending_backhaul_requests(),
        ["agps", "izat"].into_iter().map(String::from).collect::<BTreeSet<_>>()
    );
    assert_eq!(hub.replay_pending_backhaul(), 0);

    let actions = Arc::new(RecordingActions::default());
    hub.set_action_gateway(actions.clone());
    hub.flush().await.unwrap();
    assert!(actions.calls().is_empty(), "attaching alone never replays");

    assert_eq!(hub.replay_pending_backhaul(), 2);
    hub.flush().await.unwrap();
    assert_eq!(
        actions.calls(),
        vec![Action::Connect("agps".into()), Action::Connect("izat".into())]
    );
    assert!(hub.pending_backhaul_requests().is_empty());
    assert_eq!(hub.replay_pending_backhaul(), 0);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_commands_before_start_run_in_order() {
    let gateway = Arc::new(RecordingGateway::default());
    let hub = ObserverHub::new(
        HubConfig::default(),
        HubContext::default().with_subscription_gateway(gateway.clone()),
    );
    let (a, mut a_rx) = observer("A");

    hub.notify(&[raw(1, json!({"early": true}))]);
    hub.subscribe(&[id(1)], &a, false);
    hub.start().await.unwrap();
    hub.flush().await.unwrap();

    assert_eq!(ids_of(&a_rx.try_recv().unwrap()), vec![1]);
    assert_eq!(gateway.calls(), vec![Upstream::Subscribe(vec![1])]);
}

#[tokio::test]
async fn test_start_twice_fails() {
    let (hub, _gateway) = started(HubConfig::default()).await;
    let err = hub.start().await.unwrap_err();
    assert!(matches!(err, HubError::AlreadyStarted { .. }), "got: {err:?}");
}

#[tokio::test]
async fn test_shutdown_stops_worker() {
    let (hub, gateway) = started(HubConfig::default()).await;
    let (a, _a_rx) = observer("A");
    assert!(hub.connect_backhaul("late").is_err());
    hub.subscribe(&[id(1)], &a, false);
    hub.flush().await.unwrap();

    hub.shutdown().await;

    assert!(matches!(hub.flush().await, Err(HubError::Stopped)));
    assert!(matches!(hub.inspect().await, Err(HubError::Stopped)));
    assert!(hub.pending_backhaul_requests().is_empty());

    hub.subscribe(&[id(2)], &a, false);
    assert_eq!(gateway.calls(), vec![Upstream::Subscribe(vec![1])]);
}

struct Silent;

impl Observer for Silent {
    fn name(&self) -> &str {
        "silent"
    }

    fn notify(&self, _values: Vec<DataItem>) {}
}

#[tokio::test]
async fn test_dropping_last_handle_releases_state() {
    let (hub, gateway) = started(HubConfig::default()).await;
    let silent = Arc::new(Silent);
    let handle = ObserverHandle::from(Arc::clone(&silent));

    hub.subscribe(&[id(1), id(2)], &handle, false);
    hub.notify(&[raw(1, json!({"on": true}))]);
    hub.flush().await.unwrap();
    drop(handle);
    assert!(Arc::strong_count(&silent) > 1);

    drop(hub);

    tokio::time::timeout(Duration::from_secs(2), async {
        while Arc::strong_count(&silent) > 1 || Arc::strong_count(&gateway) > 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(Arc::strong_count(&silent), 1);
    assert_eq!(Arc::strong_count(&gateway), 1);
}
