//! Scenario files and their replay against a hub.
//!
//! A scenario is a JSON document listing which gateways exist up front,
//! optional upstream payloads served on `request_data`, and an ordered
//! list of hub operations.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use statushub_core::{
    DataItem, DataItemId, HubConfig, HubContext, HubError, HubSnapshot, ObserverHandle,
    ObserverHub, RawDataItem,
};

use crate::error::CliError;
use crate::recorder::{Event, RecordingActions, RecordingObserver, RecordingSubscriptions, Source, Transcript};

// ── Scenario model ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Attach a subscription gateway when the hub is built.
    #[serde(default = "default_true")]
    pub subscription_gateway: bool,

    /// Attach an action gateway when the hub is built.
    #[serde(default = "default_true")]
    pub action_gateway: bool,

    /// Payloads the subscription gateway pushes back on `request_data`.
    #[serde(default)]
    pub upstream: BTreeMap<String, serde_json::Value>,

    pub steps: Vec<Step>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    Subscribe {
        observer: String,
        items: Vec<String>,
        #[serde(default)]
        request_fresh: bool,
    },
    UpdateSubscription {
        observer: String,
        items: Vec<String>,
    },
    Unsubscribe {
        observer: String,
        items: Vec<String>,
    },
    UnsubscribeAll {
        observer: String,
    },
    Notify {
        values: Vec<NotifyValue>,
    },
    AttachSubscriptionGateway,
    AttachActionGateway,
    TurnOn {
        item: String,
        #[serde(default)]
        timeout_ms: u64,
    },
    TurnOff {
        item: String,
    },
    ConnectBackhaul {
        client: String,
    },
    DisconnectBackhaul {
        client: String,
    },
    ReplayBackhaul,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyValue {
    pub item: String,
    /// Field map for the value; omitted means no fields.
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CliError::ScenarioNotFound { path: display.clone() }
            } else {
                CliError::Io(e)
            }
        })?;
        serde_json::from_str(&text).map_err(|source| CliError::ScenarioInvalid {
            path: display,
            source,
        })
    }
}

fn parse_item(field: &str, raw: &str) -> Result<DataItemId, CliError> {
    raw.parse().map_err(|e: statushub_core::ParseDataItemIdError| CliError::Validation {
        field: field.into(),
        reason: e.to_string(),
    })
}

fn parse_items(raw: &[String]) -> Result<Vec<DataItemId>, CliError> {
    raw.iter().map(|r| parse_item("items", r)).collect()
}

// ── Report ──────────────────────────────────────────────────────────

/// Final hub state, keyed by names rather than handles.
#[derive(Debug, Serialize)]
pub struct StateView {
    /// Observer name -> subscribed items.
    pub subscriptions: BTreeMap<String, Vec<String>>,
    pub cached: Vec<DataItem>,
    /// Item -> activation references.
    pub active: BTreeMap<String, u32>,
    pub pending_backhaul: Vec<String>,
    pub symmetric: bool,
}

impl StateView {
    fn new(snapshot: &HubSnapshot, pending_backhaul: BTreeSet<String>) -> Self {
        let subscriptions = snapshot
            .observer_items
            .keys()
            .map(|observer| {
                let items = snapshot
                    .items_of(observer)
                    .into_iter()
                    .map(|id| id.to_string())
                    .collect();
                (observer.name().to_owned(), items)
            })
            .collect();

        Self {
            subscriptions,
            cached: snapshot.cached.values().cloned().collect(),
            active: snapshot
                .active
                .iter()
                .map(|(id, refs)| (id.to_string(), *refs))
                .collect(),
            pending_backhaul: pending_backhaul.into_iter().collect(),
            symmetric: snapshot.is_symmetric(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub hub: String,
    pub steps: usize,
    pub events: Vec<Event>,
    pub state: StateView,
}

// ── Replay ──────────────────────────────────────────────────────────

struct Replay {
    hub: ObserverHub,
    transcript: Arc<Transcript>,
    upstream: BTreeMap<DataItemId, serde_json::Value>,
    observers: HashMap<String, ObserverHandle>,
}

impl Replay {
    fn observer(&mut self, name: &str) -> ObserverHandle {
        if let Some(handle) = self.observers.get(name) {
            return handle.clone();
        }
        let handle = ObserverHandle::from(Arc::new(RecordingObserver::new(
            name,
            Arc::clone(&self.transcript),
        )));
        self.observers.insert(name.to_owned(), handle.clone());
        handle
    }

    fn subscriptions(&self) -> Arc<RecordingSubscriptions> {
        Arc::new(RecordingSubscriptions::new(
            Arc::clone(&self.transcript),
            self.upstream.clone(),
        ))
    }

    fn actions(&self) -> Arc<RecordingActions> {
        Arc::new(RecordingActions::new(Arc::clone(&self.transcript)))
    }

    fn apply(&mut self, step: &Step) -> Result<(), CliError> {
        match step {
            Step::Subscribe {
                observer,
                items,
                request_fresh,
            } => {
                let handle = self.observer(observer);
                self.hub.subscribe(&parse_items(items)?, &handle, *request_fresh);
            }
            Step::UpdateSubscription { observer, items } => {
                let handle = self.observer(observer);
                self.hub.update_subscription(&parse_items(items)?, &handle);
            }
            Step::Unsubscribe { observer, items } => {
                let handle = self.observer(observer);
                self.hub.unsubscribe(&parse_items(items)?, &handle);
            }
            Step::UnsubscribeAll { observer } => {
                let handle = self.observer(observer);
                self.hub.unsubscribe_all(&handle);
            }
            Step::Notify { values } => {
                let raw = values
                    .iter()
                    .map(|v| -> Result<RawDataItem, CliError> {
                        Ok(RawDataItem::new(parse_item("item", &v.item)?, v.payload.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.hub.notify(&raw);
            }
            Step::AttachSubscriptionGateway => {
                self.hub.set_subscription_gateway(self.subscriptions());
            }
            Step::AttachActionGateway => {
                self.hub.set_action_gateway(self.actions());
            }
            Step::TurnOn { item, timeout_ms } => {
                let id = parse_item("item", item)?;
                self.hub.turn_on(id, Duration::from_millis(*timeout_ms));
            }
            Step::TurnOff { item } => {
                self.hub.turn_off(parse_item("item", item)?);
            }
            Step::ConnectBackhaul { client } => {
                self.backhaul("connect_backhaul", self.hub.connect_backhaul(client))?;
            }
            Step::DisconnectBackhaul { client } => {
                self.backhaul("disconnect_backhaul", self.hub.disconnect_backhaul(client))?;
            }
            Step::ReplayBackhaul => {
                let count = self.hub.replay_pending_backhaul();
                self.transcript.record(
                    Source::Hub,
                    "replay_backhaul",
                    vec![count.to_string()],
                    Vec::new(),
                );
            }
        }
        Ok(())
    }

    /// A missing action gateway is part of the scenario, not a failure.
    fn backhaul(&self, op: &str, result: Result<(), HubError>) -> Result<(), CliError> {
        match result {
            Ok(()) => Ok(()),
            Err(HubError::ActionGatewayUnavailable { client }) => {
                self.transcript
                    .record(Source::Hub, format!("{op} pending"), vec![client], Vec::new());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Run `scenario` against a fresh hub built from `config`.
pub async fn run(scenario: &Scenario, config: HubConfig) -> Result<Report, CliError> {
    let upstream = scenario
        .upstream
        .iter()
        .map(|(item, payload)| -> Result<_, CliError> {
            Ok((parse_item("upstream", item)?, payload.clone()))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    let transcript = Transcript::new();
    let context = HubContext::for_config(&config);
    let mut replay = Replay {
        hub: ObserverHub::new(config, context),
        transcript: Arc::clone(&transcript),
        upstream,
        observers: HashMap::new(),
    };
    if scenario.subscription_gateway {
        replay.hub.set_subscription_gateway(replay.subscriptions());
    }
    if scenario.action_gateway {
        replay.hub.set_action_gateway(replay.actions());
    }

    replay.hub.start().await?;
    info!(hub = %replay.hub.name(), steps = scenario.steps.len(), "replaying scenario");

    let outcome = replay_steps(&mut replay, &scenario.steps).await;
    let snapshot = match outcome {
        Ok(()) => replay.hub.inspect().await,
        Err(e) => {
            replay.hub.shutdown().await;
            return Err(e);
        }
    };
    let pending = replay.hub.pending_backhaul_requests();
    replay.hub.shutdown().await;

    Ok(Report {
        hub: replay.hub.name().to_owned(),
        steps: scenario.steps.len(),
        events: transcript.events(),
        state: StateView::new(&snapshot?, pending),
    })
}

async fn replay_steps(replay: &mut Replay, steps: &[Step]) -> Result<(), CliError> {
    for (index, step) in steps.iter().enumerate() {
        let number = index + 1;
        replay.transcript.set_step(number);
        debug!(step = number, ?step, "applying step");
        replay.apply(step)?;
        // Gateway replies are queued behind the first barrier.
        replay.hub.flush().await?;
        replay.hub.flush().await?;
    }
    Ok(())
}
