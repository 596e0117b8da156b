// ── Data item identity and values ──
//
// DataItemId names a kind of status fact, DataItem carries its latest
// content. Values are field maps so partial updates can be merged into
// what is already known instead of replacing it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── DataItemId ──────────────────────────────────────────────────────

/// Identifier for a kind of status fact (network type, airplane mode, ...).
///
/// Opaque and stable for the lifetime of the process. Well-known ids are
/// exposed as associated constants; any other raw value is still valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataItemId(u16);

macro_rules! well_known_ids {
    ($( $name:ident = $raw:literal => $label:literal ),* $(,)?) => {
        impl DataItemId {
            $( pub const $name: Self = Self($raw); )*

            /// Human-readable label for well-known ids.
            pub fn label(self) -> Option<&'static str> {
                match self.0 {
                    $( $raw => Some($label), )*
                    _ => None,
                }
            }

            fn from_label(s: &str) -> Option<Self> {
                match s {
                    $( $label => Some(Self::$name), )*
                    _ => None,
                }
            }
        }
    };
}

well_known_ids! {
    AIRPLANE_MODE = 0 => "airplane-mode",
    ENH = 1 => "enh",
    GPS_STATE = 2 => "gps-state",
    NLP_STATUS = 3 => "nlp-status",
    WIFI_HARDWARE_STATE = 4 => "wifi-hardware-state",
    NETWORK_INFO = 5 => "network-info",
    RIL_VERSION = 6 => "ril-version",
    RIL_SERVICE_INFO = 7 => "ril-service-info",
    RIL_CELL_INFO = 8 => "ril-cell-info",
    SERVICE_STATUS = 9 => "service-status",
    MODEL = 10 => "model",
    MANUFACTURER = 11 => "manufacturer",
    IN_EMERGENCY_CALL = 12 => "in-emergency-call",
    ASSISTED_GPS = 13 => "assisted-gps",
    SCREEN_STATE = 14 => "screen-state",
    POWER_CONNECTED_STATE = 15 => "power-connected-state",
    TIMEZONE_CHANGE = 16 => "timezone-change",
    TIME_CHANGE = 17 => "time-change",
    WIFI_SUPPLICANT_STATUS = 18 => "wifi-supplicant-status",
    SHUTDOWN_STATE = 19 => "shutdown-state",
    TAC = 20 => "tac",
    MCCMNC = 21 => "mccmnc",
    BTLE_SCAN = 22 => "btle-scan",
    BT_SCAN = 23 => "bt-scan",
    OEM_GTP_UPLOAD_TRIGGER_READY = 24 => "oem-gtp-upload-trigger-ready",
}

impl DataItemId {
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for DataItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => f.write_str(label),
            None => write!(f, "item#{}", self.0),
        }
    }
}

impl From<u16> for DataItemId {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

/// Error returned when a string is neither a well-known label nor a number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown data item '{0}'")]
pub struct ParseDataItemIdError(String);

impl FromStr for DataItemId {
    type Err = ParseDataItemIdError;

    /// Accepts a well-known label (`network-info`), `item#<n>`, or a bare number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(id) = Self::from_label(trimmed) {
            return Ok(id);
        }
        trimmed
            .strip_prefix("item#")
            .unwrap_or(trimmed)
            .parse::<u16>()
            .map(Self)
            .map_err(|_| ParseDataItemIdError(s.to_owned()))
    }
}

// ── DataItem ────────────────────────────────────────────────────────

/// Snapshot of a data item's content.
///
/// `Clone` produces the fresh owned copy handed to caches and observers;
/// [`merge_from`](Self::merge_from) folds a later partial update in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    id: DataItemId,
    #[serde(default)]
    fields: BTreeMap<String, serde_json::Value>,
}

impl DataItem {
    pub fn new(id: DataItemId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> DataItemId {
        self.id
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.fields
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Merge the fields of `update` into `self`.
    ///
    /// Fields present in `update` overwrite; fields absent from it are kept.
    /// Updates for a different id are ignored and return `false`.
    pub fn merge_from(&mut self, update: &DataItem) -> bool {
        if update.id != self.id {
            return false;
        }
        for (name, value) in &update.fields {
            self.fields.insert(name.clone(), value.clone());
        }
        true
    }

    /// Compact one-line rendering for logs.
    pub fn stringify(&self) -> String {
        let body = serde_json::to_string(&self.fields).unwrap_or_default();
        format!("{}: {body}", self.id)
    }
}

// ── RawDataItem ─────────────────────────────────────────────────────

/// An item as produced by the upstream source, before a value factory
/// turns it into a [`DataItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataItem {
    pub id: DataItemId,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RawDataItem {
    pub fn new(id: DataItemId, payload: serde_json::Value) -> Self {
        Self { id, payload }
    }
}
