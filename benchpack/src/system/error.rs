//! Error types for process and filesystem operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for system operations.
pub type SystemResult<T> = Result<T, SystemError>;

/// Errors from spawning processes or touching the filesystem.
#[derive(Debug, Error)]
pub enum SystemError {
    /// The program could not be started at all.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The program ran and exited unsuccessfully.
    #[error("'{program}' failed with exit code {}: {stderr}", code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The program did not finish in time and was killed.
    #[error("'{program}' timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    /// A filesystem operation failed.
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SystemError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Captured stderr of a failed process, empty for other errors.
    pub fn stderr(&self) -> &str {
        match self {
            Self::Exit { stderr, .. } => stderr,
            _ => "",
        }
    }
}
