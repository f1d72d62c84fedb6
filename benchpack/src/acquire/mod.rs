//! Source acquirers.
//!
//! One [`Acquirer`] per [`SourceKind`], held in a closed registry
//! ([`AcquirerSet`]). The engine resolves an item's destination, builds an
//! [`AcquireContext`] and hands it to the acquirer for the item's source.
//!
//! Acquirers never decide failure policy. They return an [`AcquireError`] and
//! the engine applies the required/optional/authentication rules.

mod error;
mod git;
pub mod http;
mod hub;
mod install_temp;
mod local;
mod pip;
mod url;
mod winget;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::checksum;
use crate::config::EngineConfig;
use crate::manifest::{Item, SourceKind};
use crate::paths::{PartialStore, PathResolver};
use crate::progress::{self, SharedObserver};
use crate::system::SystemOps;

pub use error::{AcquireError, AcquireResult};
pub use git::GitAcquirer;
pub use http::{HttpClient, RemoteInfo};
pub use hub::{parse_remote_path, HubAcquirer};
pub use install_temp::InstallTempAcquirer;
pub use local::LocalAcquirer;
pub use pip::{is_transient_lock, PipAcquirer};
pub use url::UrlAcquirer;
pub use winget::WingetAcquirer;

/// Result of a successful acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquired {
    /// Content was transferred, copied or installed.
    Installed,
    /// Nothing needed doing; the reason is for the log.
    Skipped(String),
}

/// Everything an acquirer needs for one item.
pub struct AcquireContext<'a> {
    pub item: &'a Item,
    /// Resolved destination; `None` for ambient sources (pip, winget).
    pub dest: Option<&'a Path>,
    pub config: &'a EngineConfig,
    pub resolver: &'a PathResolver,
    pub partials: &'a PartialStore,
    pub system: &'a dyn SystemOps,
    /// Checksum verification requested for this run.
    pub verify_checksums: bool,
    pub observer: Option<&'a SharedObserver>,
}

impl<'a> AcquireContext<'a> {
    /// The resolved destination, or a `MissingField` error.
    pub fn destination(&self) -> AcquireResult<&'a Path> {
        self.dest.ok_or_else(|| self.missing("path"))
    }

    /// A required string field of the item.
    pub fn field(&self, value: &'a Option<String>, name: &'static str) -> AcquireResult<&'a str> {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| self.missing(name))
    }

    fn missing(&self, field: &'static str) -> AcquireError {
        AcquireError::MissingField {
            item: self.item.name.clone(),
            field,
        }
    }

    /// Whether this item's content is checksum-verified in this run.
    pub fn should_verify(&self) -> bool {
        self.verify_checksums && self.item.verifies_checksum()
    }

    /// Create the parent directory of `path`.
    pub(crate) fn ensure_parent(&self, path: &Path) -> AcquireResult<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self
                .system
                .create_dir_all(parent)
                .map_err(|e| AcquireError::io("failed to create directory", parent, e)),
            _ => Ok(()),
        }
    }

    /// Move a finished file onto `dest`, replacing any file already there.
    pub(crate) fn place_file(&self, from: &Path, dest: &Path) -> AcquireResult<()> {
        self.ensure_parent(dest)?;
        if dest.is_file() {
            self.system
                .remove_file(dest)
                .map_err(|e| AcquireError::io("failed to replace", dest, e))?;
        }
        self.system
            .rename(from, dest)
            .map_err(|e| AcquireError::io("failed to move into place", dest, e))
    }

    /// Verify `path` against `expected`, with progress for large files.
    pub(crate) fn verify_file(&self, path: &Path, expected: &str) -> AcquireResult<()> {
        info!(item = %self.item.name, "Verifying checksum");

        let total = path.metadata().map(|m| m.len()).unwrap_or(0);
        let label = format!("verify {}", self.item.name);
        let cb = if total > checksum::PROGRESS_THRESHOLD {
            progress::begin(self.observer, &label, total)
        } else {
            None
        };

        let actual = checksum::calculate_with_progress(path, cb.as_ref())
            .map_err(|e| AcquireError::io("failed to read", path, e));
        if cb.is_some() {
            if let Some(observer) = self.observer {
                observer.finish(&label);
            }
        }
        let actual = actual?;

        if checksum::digests_match(&actual, expected) {
            Ok(())
        } else {
            warn!(item = %self.item.name, expected = %expected, actual = %actual, "Checksum mismatch");
            Err(AcquireError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: expected.to_string(),
                actual,
            })
        }
    }
}

/// A transfer mechanism for one source kind.
pub trait Acquirer: Send + Sync {
    /// Bring the item's destination into the declared state.
    fn acquire(&self, ctx: &AcquireContext<'_>) -> AcquireResult<Acquired>;
}

/// One handler per source kind.
pub struct AcquirerSet {
    hub: HubAcquirer,
    git: GitAcquirer,
    url: UrlAcquirer,
    local: LocalAcquirer,
    pip: PipAcquirer,
    install_temp: InstallTempAcquirer,
    winget: WingetAcquirer,
}

impl AcquirerSet {
    /// Standard handlers sharing one HTTP client.
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self {
            hub: HubAcquirer::new(Arc::clone(&http)),
            git: GitAcquirer,
            url: UrlAcquirer::new(http),
            local: LocalAcquirer,
            pip: PipAcquirer,
            install_temp: InstallTempAcquirer,
            winget: WingetAcquirer,
        }
    }

    /// Handler for a source; `None` for `bundled`, which is placed externally.
    pub fn for_source(&self, source: SourceKind) -> Option<&dyn Acquirer> {
        match source {
            SourceKind::Bundled => None,
            SourceKind::Huggingface => Some(&self.hub),
            SourceKind::Git => Some(&self.git),
            SourceKind::Url => Some(&self.url),
            SourceKind::Local => Some(&self.local),
            SourceKind::Pip => Some(&self.pip),
            SourceKind::InstallTemp => Some(&self.install_temp),
            SourceKind::Winget => Some(&self.winget),
        }
    }
}

/// Resolve a user-supplied local path: as given when it exists, otherwise
/// relative to the manifest directory.
pub(crate) fn resolve_local_source(raw: &str, manifest_dir: Option<&Path>) -> Option<PathBuf> {
    let given = PathBuf::from(raw);
    if given.exists() {
        return Some(given);
    }
    if given.is_relative() {
        if let Some(candidate) = manifest_dir.map(|dir| dir.join(&given)) {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_every_source_but_bundled_has_a_handler() {
        let set = AcquirerSet::new(Arc::new(HttpClient::new(Duration::from_secs(5)).unwrap()));
        for source in SourceKind::ALL {
            assert_eq!(
                set.for_source(source).is_some(),
                source != SourceKind::Bundled,
                "source {}",
                source
            );
        }
    }

    #[test]
    fn test_verify_file_mismatch_reports_actual() {
        let temp = TempDir::new().unwrap();
        let fixture = Fixture::new(temp.path());
        let path = temp.path().join("model.bin");
        fs::write(&path, b"hello world").unwrap();

        let it = item(serde_json::json!({
            "name": "m", "type": "model", "source": "url",
            "url": "http://x", "path": "model.bin"
        }));
        let sys = ScriptedSystem::default();
        let ctx = fixture.ctx(&it, Some(&path), &sys);

        assert!(ctx
            .verify_file(
                &path,
                "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9"
            )
            .is_ok());
        match ctx.verify_file(&path, "00") {
            Err(AcquireError::ChecksumMismatch { actual, .. }) => {
                assert!(actual.starts_with("b94d27b9"));
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_field_names_item() {
        let temp = TempDir::new().unwrap();
        let fixture = Fixture::new(temp.path());
        let it = item(serde_json::json!({
            "name": "numpy", "type": "pip_package", "source": "pip", "package": "numpy"
        }));
        let sys = ScriptedSystem::default();
        let ctx = fixture.ctx(&it, None, &sys);

        let err = ctx.destination().unwrap_err();
        assert_eq!(err.to_string(), "item 'numpy' has no 'path'");
    }

    #[test]
    fn test_resolve_local_source_relative_to_manifest() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("wheels")).unwrap();
        fs::write(temp.path().join("wheels/pkg.whl"), b"x").unwrap();

        assert_eq!(
            resolve_local_source("wheels/pkg.whl", Some(temp.path())),
            Some(temp.path().join("wheels/pkg.whl"))
        );
        assert_eq!(resolve_local_source("wheels/missing.whl", Some(temp.path())), None);
    }
}
