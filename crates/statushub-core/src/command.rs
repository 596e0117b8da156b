// ── Command queue payloads ──
//
// Every public hub operation validates on the caller's thread, then
// captures its request as one `Command` and hands it to the worker.
// Commands own their payloads; nothing is shared with the caller.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::gateway::{ActionGateway, SubscriptionGateway};
use crate::model::{DataItem, DataItemId, ObserverHandle};
use crate::store::HubSnapshot;

/// A unit of work for the command processor.
#[derive(strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum Command {
    // ── Subscriptions ────────────────────────────────────────────────
    Subscribe {
        ids: HashSet<DataItemId>,
        observer: ObserverHandle,
        request_fresh: bool,
    },
    UpdateSubscription {
        ids: HashSet<DataItemId>,
        observer: ObserverHandle,
    },
    Unsubscribe {
        ids: HashSet<DataItemId>,
        observer: ObserverHandle,
    },
    UnsubscribeAll {
        observer: ObserverHandle,
    },

    // ── Values ───────────────────────────────────────────────────────
    Notify {
        batch: Vec<DataItem>,
    },

    // ── Upstream ─────────────────────────────────────────────────────
    SetSubscriptionGateway {
        gateway: Arc<dyn SubscriptionGateway>,
    },
    TurnOn {
        gateway: Arc<dyn ActionGateway>,
        id: DataItemId,
        timeout: Duration,
    },
    TurnOff {
        gateway: Arc<dyn ActionGateway>,
        id: DataItemId,
    },
    ConnectBackhaul {
        gateway: Arc<dyn ActionGateway>,
        client: String,
    },
    DisconnectBackhaul {
        gateway: Arc<dyn ActionGateway>,
        client: String,
    },

    // ── Synchronization ──────────────────────────────────────────────
    Flush {
        done: oneshot::Sender<()>,
    },
    Inspect {
        reply: oneshot::Sender<HubSnapshot>,
    },
}

impl Command {
    pub(crate) fn kind(&self) -> &'static str {
        self.into()
    }
}
