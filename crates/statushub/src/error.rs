//! CLI error types with miette diagnostics.
//!
//! Maps config, scenario and hub failures into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use statushub_config::ConfigError;
use statushub_core::HubError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Scenario ─────────────────────────────────────────────────────

    #[error("No scenario file given")]
    #[diagnostic(
        code(statushub::no_scenario),
        help(
            "Pass a file: statushub replay <FILE>\n\
             Or set default_scenario in {config_path}"
        )
    )]
    NoScenario { config_path: String },

    #[error("Scenario file '{path}' not found")]
    #[diagnostic(code(statushub::scenario_not_found))]
    ScenarioNotFound { path: String },

    #[error("Invalid scenario '{path}': {source}")]
    #[diagnostic(
        code(statushub::scenario_invalid),
        help("Each step needs an \"op\" field, e.g. {{\"op\": \"subscribe\", \"observer\": \"A\", \"items\": [\"network-info\"]}}")
    )]
    ScenarioInvalid {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(statushub::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(code(statushub::config_exists), help("Use --force to overwrite it."))]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(statushub::config),
        help("Check the config file and STATUSHUB_* environment variables.")
    )]
    Config(#[from] ConfigError),

    // ── Hub ──────────────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(statushub::hub))]
    Hub(#[from] HubError),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(statushub::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoScenario { .. } | Self::Validation { .. } | Self::ScenarioInvalid { .. } => {
                exit_code::USAGE
            }
            Self::ScenarioNotFound { .. } => exit_code::NOT_FOUND,
            Self::Config(_) | Self::ConfigExists { .. } => exit_code::CONFIG,
            Self::Hub(_) | Self::Io(_) | Self::Render(_) => exit_code::GENERAL,
        }
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Render(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Render(err.to_string())
    }
}
