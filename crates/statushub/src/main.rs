mod cli;
mod commands;
mod error;
mod output;
mod recorder;
mod scenario;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use statushub_config::{Config, ConfigError, LogSection};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging settings come from the config file, so load it first.
    let loaded = statushub_config::load_config(cli.global.config.as_deref());
    init_tracing(cli.global.verbose, loaded.as_ref().ok().map(|cfg| &cfg.log));

    if let Err(err) = run(cli, loaded).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// `RUST_LOG` wins; otherwise `-v` flags, otherwise the configured level.
fn init_tracing(verbosity: u8, log: Option<&LogSection>) {
    let configured = log.map_or("warn", |l| l.level.as_str());
    let filter = match verbosity {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if log.is_some_and(|l| l.format == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli, loaded: Result<Config, ConfigError>) -> Result<(), CliError> {
    match cli.command {
        Command::Replay(args) => {
            let cfg = loaded?;
            tracing::debug!(file = ?args.file, "dispatching replay");
            commands::replay::handle(args, &cli.global, &cfg).await
        }

        Command::Config(args) => commands::config_cmd::handle(args, &cli.global, loaded),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "statushub", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Config file in effect: `--config` / `STATUSHUB_CONFIG`, else the platform path.
pub(crate) fn config_location(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(statushub_config::config_path)
}
