//! Pre-download state of every item.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::checksum;
use crate::manifest::{Item, SourceKind};
use crate::paths::{PartialStore, PathResolver};

/// Why an item does or does not need acquiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusReason {
    ExistsAndValid,
    ExistsNoChecksum,
    ChecksumMismatch,
    Missing,
    InstallTempAlwaysCopy,
    /// Installed into an ambient environment (pip, winget); never checkable.
    AmbientPackage(SourceKind),
}

impl StatusReason {
    /// Whether the item is already in its declared state.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::ExistsAndValid | Self::ExistsNoChecksum)
    }
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExistsAndValid => f.write_str("exists_and_valid"),
            Self::ExistsNoChecksum => f.write_str("exists_no_checksum"),
            Self::ChecksumMismatch => f.write_str("checksum_mismatch"),
            Self::Missing => f.write_str("missing"),
            Self::InstallTempAlwaysCopy => f.write_str("install_temp_always_copy"),
            Self::AmbientPackage(source) => write!(f, "{}_package", source),
        }
    }
}

/// Snapshot of one item's destination.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStatus {
    pub exists: bool,
    pub valid: bool,
    pub needs_download: bool,
    pub reason: StatusReason,
    pub partial_exists: bool,
    pub partial_size: u64,
    pub destination: Option<PathBuf>,
}

impl FileStatus {
    fn new(reason: StatusReason, exists: bool, destination: Option<PathBuf>) -> Self {
        Self {
            exists,
            valid: reason.is_satisfied(),
            needs_download: !reason.is_satisfied(),
            reason,
            partial_exists: false,
            partial_size: 0,
            destination,
        }
    }

    /// Partial size in megabytes, for display.
    pub fn partial_mb(&self) -> f64 {
        self.partial_size as f64 / 1024.0 / 1024.0
    }
}

/// Status of every non-bundled item, keyed by item name.
pub type StatusMap = BTreeMap<String, FileStatus>;

/// Compute the status of one item.
///
/// Returns `None` for bundled items, which are placed externally.
pub fn compute_status(
    item: &Item,
    resolver: &PathResolver,
    partials: &PartialStore,
    resume: bool,
) -> Option<FileStatus> {
    if item.source == SourceKind::Bundled {
        return None;
    }
    if item.source.is_ambient() {
        return Some(FileStatus::new(StatusReason::AmbientPackage(item.source), false, None));
    }

    let dest = resolver.resolve(item);
    let exists = dest.as_deref().is_some_and(|p| p.exists());

    let reason = if item.source == SourceKind::InstallTemp {
        StatusReason::InstallTempAlwaysCopy
    } else if !exists {
        StatusReason::Missing
    } else if let (Some(expected), Some(path)) = (item.checksum(), dest.as_deref()) {
        if checksum::verify(path, expected) {
            StatusReason::ExistsAndValid
        } else {
            StatusReason::ChecksumMismatch
        }
    } else {
        StatusReason::ExistsNoChecksum
    };

    let mut status = FileStatus::new(reason, exists, dest);
    if resume && item.source == SourceKind::Url {
        if let Some(size) = item.path.as_deref().and_then(|p| partials.partial_size(p)) {
            status.partial_exists = true;
            status.partial_size = size;
        }
    }

    match reason {
        StatusReason::ExistsAndValid => info!(item = %item.name, "Exists and checksum matches"),
        StatusReason::ExistsNoChecksum => info!(item = %item.name, "Exists (no checksum to verify)"),
        StatusReason::ChecksumMismatch => {
            warn!(item = %item.name, "Exists but checksum mismatch, will re-download")
        }
        StatusReason::Missing if status.partial_exists => info!(
            item = %item.name,
            "Not found, will resume ({:.1} MB partial)",
            status.partial_mb()
        ),
        StatusReason::Missing => info!(item = %item.name, "Not found, will download"),
        StatusReason::InstallTempAlwaysCopy => {
            debug!(item = %item.name, "Bundle copy always runs")
        }
        StatusReason::AmbientPackage(_) => {}
    }

    Some(status)
}

/// Memoized status map shared by the summary and the download filter.
#[derive(Debug, Default)]
pub struct StatusCache {
    inner: Mutex<Option<Arc<StatusMap>>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached map, computing it first if absent.
    pub fn get_or_compute<F>(&self, compute: F) -> Arc<StatusMap>
    where
        F: FnOnce() -> StatusMap,
    {
        let mut guard = self.inner.lock();
        if let Some(map) = guard.as_ref() {
            return Arc::clone(map);
        }
        let map = Arc::new(compute());
        *guard = Some(Arc::clone(&map));
        map
    }

    /// Drop the cached map; the next read recomputes.
    pub fn invalidate(&self) {
        *self.inner.lock() = None;
    }

    pub fn is_cached(&self) -> bool {
        self.inner.lock().is_some()
    }
}
