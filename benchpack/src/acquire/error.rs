//! Error types for source acquirers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::system::SystemError;

/// Result type for acquisition.
pub type AcquireResult<T> = Result<T, AcquireError>;

/// Errors raised while acquiring a single item.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The hub rejected the credential, or none was supplied for a gated item.
    #[error("authentication failed for {url}: {message}")]
    Authentication { url: String, message: String },

    /// HTTP request failed or returned an unexpected status.
    #[error("download from {url} failed: {reason}")]
    Http { url: String, reason: String },

    /// HTTP request timed out.
    #[error("request to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// Filesystem operation failed.
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A subprocess or system operation failed.
    #[error(transparent)]
    Command(#[from] SystemError),

    /// The acquired content does not match the expected digest.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// A local or bundled source does not exist.
    #[error("source path not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// The item lacks a field its source needs.
    #[error("item '{item}' has no '{field}'")]
    MissingField { item: String, field: &'static str },

    /// The source cannot run on this platform.
    #[error("{0} is not supported on this platform")]
    UnsupportedPlatform(String),

    /// A file stayed locked through every retry.
    #[error("files still locked after {attempts} attempts: {source}")]
    TransientLock {
        attempts: u32,
        #[source]
        source: SystemError,
    },
}

impl AcquireError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Whether this failure means the credential is missing or wrong.
    ///
    /// True for [`AcquireError::Authentication`] and for HTTP or command
    /// failures whose remote message carries an authorization signature
    /// such as `403 Forbidden` or `gated repo`. Matching is by whole words,
    /// so `aggregated` or a `0.403` version never count.
    pub fn is_authentication_failure(&self) -> bool {
        let message = match self {
            Self::Authentication { .. } => return true,
            Self::Http { reason, .. } => reason.as_str(),
            Self::Command(e) => e.stderr(),
            _ => return false,
        };
        has_auth_signature(message)
    }
}

/// Word sequences that identify a refused or missing credential.
const AUTH_SIGNATURES: &[&[&str]] = &[
    &["401", "unauthorized"],
    &["403", "forbidden"],
    &["401", "client", "error"],
    &["403", "client", "error"],
    &["http", "401"],
    &["http", "403"],
    &["status", "401"],
    &["status", "403"],
    &["code", "401"],
    &["code", "403"],
    &["authentication", "failed"],
    &["authentication", "required"],
    &["gated", "repo"],
    &["gated", "model"],
    &["is", "gated"],
    &["hf_token"],
];

fn has_auth_signature(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();

    AUTH_SIGNATURES
        .iter()
        .any(|sig| words.windows(sig.len()).any(|w| w == *sig))
}
