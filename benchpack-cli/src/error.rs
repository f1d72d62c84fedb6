//! CLI error type.

use std::fmt;

use benchpack::config::ConfigError;
use benchpack::logging::LoggingError;
use benchpack::EngineError;

/// Errors that end the process with a failure exit code.
#[derive(Debug)]
pub enum CliError {
    /// Missing or inconsistent settings.
    Config(String),
    ConfigFile(ConfigError),
    Logging(LoggingError),
    Engine(EngineError),
    /// Partial downloads could not be deleted.
    Cleanup(String),
    /// The token prompt could not be shown or read.
    Prompt(dialoguer::Error),
    /// Authentication kept failing after every prompt.
    AuthenticationExhausted { attempts: u32, last: EngineError },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Logging(e) => write!(f, "{}", e),
            CliError::Engine(e) => write!(f, "{}", e),
            CliError::Cleanup(msg) => write!(f, "cleanup failed: {}", msg),
            CliError::Prompt(e) => write!(f, "failed to read token: {}", e),
            CliError::AuthenticationExhausted { attempts, last } => write!(
                f,
                "authentication still failing after {} attempts: {}",
                attempts, last
            ),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(_) | CliError::Cleanup(_) => None,
            CliError::ConfigFile(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Engine(e) => Some(e),
            CliError::Prompt(e) => Some(e),
            CliError::AuthenticationExhausted { last, .. } => Some(last),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        CliError::Engine(e)
    }
}

impl From<dialoguer::Error> for CliError {
    fn from(e: dialoguer::Error) -> Self {
        CliError::Prompt(e)
    }
}
