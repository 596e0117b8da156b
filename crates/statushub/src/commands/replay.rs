//! `statushub replay` handler.

use std::path::PathBuf;

use statushub_config::Config;

use crate::cli::{GlobalOpts, ReplayArgs};
use crate::error::CliError;
use crate::output;
use crate::scenario::{self, Scenario};

pub async fn handle(args: ReplayArgs, global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    let path: PathBuf = args
        .file
        .or_else(|| cfg.default_scenario.clone())
        .ok_or_else(|| CliError::NoScenario {
            config_path: crate::config_location(global).display().to_string(),
        })?;

    let scenario = Scenario::load(&path)?;
    let report = scenario::run(&scenario, cfg.to_hub_config()?).await?;

    let rendered = output::render_report(global.output, &report)?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
