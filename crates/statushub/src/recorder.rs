//! Recording collaborators for scenario replay.
//!
//! Observers and gateways that append everything they see to a shared
//! transcript, tagged with the scenario step that was running.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

use statushub_core::{
    ActionGateway, DataItem, DataItemId, Observer, ObserverHub, RawDataItem, SubscriptionGateway,
};

// ── Transcript ──────────────────────────────────────────────────────

/// Who produced a transcript event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Observer,
    Subscription,
    Action,
    Hub,
}

impl Source {
    pub fn label(self) -> &'static str {
        match self {
            Self::Observer => "observer",
            Self::Subscription => "subscription",
            Self::Action => "action",
            Self::Hub => "hub",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub step: usize,
    pub source: Source,
    /// Observer name, upstream call, or hub notice.
    pub call: String,
    /// Item ids or backhaul client the event concerns.
    pub target: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<DataItem>,
}

/// Shared, step-tagged event log.
#[derive(Debug, Default)]
pub struct Transcript {
    step: AtomicUsize,
    events: Mutex<Vec<Event>>,
}

impl Transcript {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_step(&self, step: usize) {
        self.step.store(step, Ordering::SeqCst);
    }

    pub fn record(&self, source: Source, call: impl Into<String>, target: Vec<String>, values: Vec<DataItem>) {
        let event = Event {
            step: self.step.load(Ordering::SeqCst),
            source,
            call: call.into(),
            target,
            values,
        };
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn labels(ids: &[DataItemId]) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

// ── Observer ────────────────────────────────────────────────────────

pub struct RecordingObserver {
    name: String,
    transcript: Arc<Transcript>,
}

impl RecordingObserver {
    pub fn new(name: impl Into<String>, transcript: Arc<Transcript>) -> Self {
        Self {
            name: name.into(),
            transcript,
        }
    }
}

impl Observer for RecordingObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify(&self, values: Vec<DataItem>) {
        let ids: Vec<DataItemId> = values.iter().map(DataItem::id).collect();
        self.transcript
            .record(Source::Observer, self.name.clone(), labels(&ids), values);
    }
}

// ── Gateways ────────────────────────────────────────────────────────

/// Subscription gateway that records calls and answers `request_data`
/// from a fixed table of upstream payloads.
pub struct RecordingSubscriptions {
    transcript: Arc<Transcript>,
    upstream: BTreeMap<DataItemId, serde_json::Value>,
}

impl RecordingSubscriptions {
    pub fn new(transcript: Arc<Transcript>, upstream: BTreeMap<DataItemId, serde_json::Value>) -> Self {
        Self {
            transcript,
            upstream,
        }
    }
}

impl SubscriptionGateway for RecordingSubscriptions {
    fn subscribe(&self, ids: &[DataItemId], _hub: &ObserverHub) {
        self.transcript
            .record(Source::Subscription, "subscribe", labels(ids), Vec::new());
    }

    fn unsubscribe(&self, ids: &[DataItemId], _hub: &ObserverHub) {
        self.transcript
            .record(Source::Subscription, "unsubscribe", labels(ids), Vec::new());
    }

    fn request_data(&self, ids: &[DataItemId], hub: &ObserverHub) {
        self.transcript
            .record(Source::Subscription, "request_data", labels(ids), Vec::new());

        let replies: Vec<RawDataItem> = ids
            .iter()
            .filter_map(|id| {
                self.upstream
                    .get(id)
                    .map(|payload| RawDataItem::new(*id, payload.clone()))
            })
            .collect();
        if !replies.is_empty() {
            hub.notify(&replies);
        }
    }
}

pub struct RecordingActions {
    transcript: Arc<Transcript>,
}

impl RecordingActions {
    pub fn new(transcript: Arc<Transcript>) -> Self {
        Self { transcript }
    }
}

impl ActionGateway for RecordingActions {
    fn turn_on(&self, id: DataItemId, timeout: Duration) {
        self.transcript.record(
            Source::Action,
            format!("turn_on ({}ms)", timeout.as_millis()),
            vec![id.to_string()],
            Vec::new(),
        );
    }

    fn turn_off(&self, id: DataItemId) {
        self.transcript
            .record(Source::Action, "turn_off", vec![id.to_string()], Vec::new());
    }

    fn connect_backhaul(&self, client: &str) {
        self.transcript
            .record(Source::Action, "connect_backhaul", vec![client.to_owned()], Vec::new());
    }

    fn disconnect_backhaul(&self, client: &str) {
        self.transcript.record(
            Source::Action,
            "disconnect_backhaul",
            vec![client.to_owned()],
            Vec::new(),
        );
    }
}
