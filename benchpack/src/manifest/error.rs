//! Error types for manifest loading and validation.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Errors raised before any acquisition starts.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file is missing or is not valid JSON/YAML.
    #[error("failed to parse manifest {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// The manifest parsed but violates the item schema.
    #[error("invalid manifest: {0}")]
    Validation(String),
}

impl ManifestError {
    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
