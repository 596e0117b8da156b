// ── Core error types ──
//
// Most hub operations are fire-and-forget and never fail from the
// caller's point of view; they log and no-op instead. These errors cover
// the few calls that do report back.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Hub '{name}' is already started")]
    AlreadyStarted { name: String },

    #[error("Hub worker has stopped")]
    Stopped,

    #[error("No action gateway configured; backhaul request from '{client}' recorded as pending")]
    ActionGatewayUnavailable { client: String },
}
