//! Command dispatch.
//!
//! Settings are resolved once (config file, environment, flags), logging is
//! installed, then either the cleanup or the install flow runs.

mod cleanup;
mod common;
mod install;

use benchpack::logging::init_logging;
use benchpack::ConfigFile;
use tracing::debug;

use crate::error::CliError;
use crate::Cli;

/// Run the command line.
pub fn run(cli: Cli) -> Result<(), CliError> {
    let file = ConfigFile::load_default()?;
    let _guard = init_logging(&common::logging_config(&cli, &file))?;
    debug!(version = env!("CARGO_PKG_VERSION"), "benchpack starting");

    let root = common::require_install_root(cli.root.clone(), &file)?;

    if cli.cleanup {
        return cleanup::run(&root);
    }

    let config = common::engine_config(&cli, root, &file);
    install::run(&cli, config)
}
