//! Shared configuration for statushub tools.
//!
//! TOML file + `STATUSHUB_` environment overrides, validation, and
//! translation to `statushub_core::HubConfig`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use statushub_core::{CachePolicy, DataItemId, HubConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Scenario replayed when `statushub replay` gets no file argument.
    pub default_scenario: Option<PathBuf>,

    #[serde(default)]
    pub hub: HubSection,

    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HubSection {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub cache_policy: CachePolicy,

    #[serde(default = "default_true")]
    pub request_data_on_attach: bool,

    /// Item labels (`network-info`), `item#<n>` or numbers. Unset accepts all.
    pub supported_items: Option<Vec<String>>,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            cache_policy: CachePolicy::default(),
            request_data_on_attach: true,
            supported_items: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LogSection {
    /// Filter directive used when neither `RUST_LOG` nor `-v` is given.
    #[serde(default = "default_level")]
    pub level: String,

    /// "pretty" or "json".
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_name() -> String {
    "statushub".into()
}
fn default_true() -> bool {
    true
}
fn default_level() -> String {
    "warn".into()
}
fn default_format() -> String {
    "pretty".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "statushub", "statushub").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("statushub");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
///
/// `path` overrides the platform location. A missing file is not an
/// error; defaults and environment still apply. Nested keys use a double
/// underscore: `STATUSHUB_HUB__CACHE_POLICY=evict-unobserved`.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("STATUSHUB_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Reject settings the hub or the CLI cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.name.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "hub.name".into(),
                reason: "must not be empty".into(),
            });
        }
        match self.log.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::Validation {
                    field: "log.format".into(),
                    reason: format!("expected 'pretty' or 'json', got '{other}'"),
                });
            }
        }
        self.supported_items().map(|_| ())
    }

    /// Parsed `hub.supported_items`.
    pub fn supported_items(&self) -> Result<Option<BTreeSet<DataItemId>>, ConfigError> {
        let Some(items) = &self.hub.supported_items else {
            return Ok(None);
        };
        items
            .iter()
            .map(|raw| {
                raw.parse::<DataItemId>()
                    .map_err(|e| ConfigError::Validation {
                        field: "hub.supported_items".into(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Some)
    }

    /// Build the core `HubConfig`.
    pub fn to_hub_config(&self) -> Result<HubConfig, ConfigError> {
        Ok(HubConfig {
            name: self.hub.name.clone(),
            cache_policy: self.hub.cache_policy,
            request_data_on_attach: self.hub.request_data_on_attach,
            supported_items: self.supported_items()?,
        })
    }
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, or the canonical
/// config path when `None`.
pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(path)
}
