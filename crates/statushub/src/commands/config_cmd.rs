//! Config subcommand handlers.

use statushub_config::{self as config, Config, ConfigError};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// `loaded` is only required by `show`; `path` and `init` work even when
/// the current file fails to load.
pub fn handle(
    args: ConfigArgs,
    global: &GlobalOpts,
    loaded: Result<Config, ConfigError>,
) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let rendered = output::render_document(global.output, &loaded?)?;
            output::print_output(&rendered, global.quiet);
        }
        ConfigCommand::Path => {
            output::print_output(&crate::config_location(global).display().to_string(), global.quiet);
        }
        ConfigCommand::Init { force } => {
            let path = crate::config_location(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            let written = config::save_config(&Config::default(), Some(&path))?;
            output::print_output(
                &format!("Wrote default configuration to {}", written.display()),
                global.quiet,
            );
        }
    }
    Ok(())
}
