//! Settings resolution shared by the commands.

use std::path::PathBuf;

use benchpack::logging::LoggingConfig;
use benchpack::{ConfigFile, EngineConfig, HfToken};
use tracing::warn;

use crate::error::CliError;
use crate::Cli;

/// Install root: `--root`, then config file.
pub fn require_install_root(cli_root: Option<PathBuf>, file: &ConfigFile) -> Result<PathBuf, CliError> {
    cli_root
        .or_else(|| file.install_root.clone())
        .ok_or_else(|| {
            CliError::Config(
                "No install root specified. Use --root or set root in config.ini [install] section."
                    .to_string(),
            )
        })
}

/// Logging settings: `-v` wins over the file's level.
pub fn logging_config(cli: &Cli, file: &ConfigFile) -> LoggingConfig {
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        file.log_level.clone().unwrap_or_else(|| "info".to_string())
    };
    LoggingConfig {
        level,
        file: cli.log_file.clone().or_else(|| file.log_file.clone()),
    }
}

/// Accept a token, warning (not failing) when its format looks wrong.
pub fn accept_token(raw: &str) -> HfToken {
    match HfToken::parse(raw) {
        Ok(token) => token,
        Err(e) => {
            warn!("Token format looks wrong ({}), using it anyway", e);
            HfToken::new_unchecked(raw)
        }
    }
}

/// Engine settings. Precedence: flag > environment > config file > default.
pub fn engine_config(cli: &Cli, root: PathBuf, file: &ConfigFile) -> EngineConfig {
    let mut config = file.apply_to(EngineConfig::from_env(root));

    if let Some(bundle) = &cli.bundle_root {
        config = config.with_bundle_root(bundle);
    }
    if let Some(workers) = cli.workers {
        config = config.with_max_workers(workers);
    }
    if cli.no_resume {
        config = config.with_resume_downloads(false);
    }
    if let Some(python) = &cli.python {
        config = config.with_python(python);
    }
    if let Some(raw) = &cli.token {
        config = config.with_hf_token(accept_token(raw));
    }
    config
}
