//! Acquisition engine.
//!
//! The [`Engine`] owns a validated manifest and brings the install root into
//! the state it declares:
//!
//! 1. [`check_existing_files`](Engine::check_existing_files) computes a
//!    [`FileStatus`] per item once and caches it, so the summary shown to the
//!    user and the download filter always agree.
//! 2. [`download_items`](Engine::download_items) filters the items, then
//!    dispatches one task per item through a [`DispatchStrategy`].
//! 3. Each task hands the item to the [`Acquirer`](crate::acquire::Acquirer)
//!    for its source and classifies the outcome: authentication failures and
//!    required-item failures abort the run, anything else is logged and
//!    dropped.
//!
//! # Example
//!
//! ```ignore
//! use benchpack::{Engine, EngineConfig, DownloadOptions};
//!
//! let config = EngineConfig::from_env("/opt/ComfyUI");
//! let engine = Engine::load("flux.yaml".as_ref(), config)?;
//! println!("{}", engine.download_summary());
//! engine.download_items(&DownloadOptions::default())?;
//! if engine.custom_nodes_were_downloaded() {
//!     println!("Restart ComfyUI to load the new nodes");
//! }
//! ```

mod status;
mod strategy;
mod summary;

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::acquire::{AcquireContext, AcquireError, Acquired, AcquirerSet, HttpClient};
use crate::config::EngineConfig;
use crate::credential::HfToken;
use crate::manifest::{Item, ItemType, ManifestDocument, ManifestError, SourceKind};
use crate::paths::{PartialStore, PathResolver};
use crate::progress::SharedObserver;
use crate::system::{HostSystem, SystemOps};

pub use status::{compute_status, FileStatus, StatusCache, StatusMap, StatusReason};
pub use strategy::{DispatchStrategy, ParallelStrategy, SequentialStrategy};
pub use summary::DownloadSummary;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that escape a run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Credential missing or rejected. Fatal regardless of `required`.
    #[error("authentication failed for '{item}': {source}")]
    Authentication {
        item: String,
        #[source]
        source: AcquireError,
    },

    #[error("failed to download required item '{item}': {source}")]
    RequiredItemFailed {
        item: String,
        #[source]
        source: AcquireError,
    },

    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The shared HTTP client could not be built.
    #[error("failed to initialise transfers: {0}")]
    Setup(#[source] AcquireError),
}

impl EngineError {
    /// Whether supplying a (different) hub token could fix this failure.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

/// Flags for one [`download_items`](Engine::download_items) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Skip items whose cached status says they are already in place.
    pub skip_existing: bool,
    pub required_only: bool,
    pub verify_checksums: bool,
    /// Log the plan without touching anything.
    pub dry_run: bool,
    pub parallel: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            skip_existing: true,
            required_only: false,
            verify_checksums: true,
            dry_run: false,
            parallel: true,
        }
    }
}

/// What a [`download_items`](Engine::download_items) call set out to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// Names of the items that passed the filter, in manifest order.
    pub planned: Vec<String>,
    pub dry_run: bool,
}

/// An item recorded in one of the outcome lists.
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledItem {
    pub item: Item,
    pub destination: Option<PathBuf>,
}

impl InstalledItem {
    /// Whether installing this item adds host-application extensions.
    pub fn is_custom_node(&self) -> bool {
        if self.item.item_type == ItemType::CustomNode {
            return true;
        }
        let declared = self.item.path.as_deref().map(Path::new);
        [self.destination.as_deref(), declared]
            .into_iter()
            .flatten()
            .any(has_custom_nodes_segment)
    }
}

fn has_custom_nodes_segment(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().eq_ignore_ascii_case("custom_nodes"),
        _ => false,
    })
}

/// Manifest-driven acquisition engine.
pub struct Engine {
    manifest: ManifestDocument,
    config: EngineConfig,
    resolver: PathResolver,
    partials: PartialStore,
    system: Arc<dyn SystemOps>,
    acquirers: AcquirerSet,
    status: StatusCache,
    observer: Option<SharedObserver>,
    downloaded: Mutex<Vec<InstalledItem>>,
    skipped: Mutex<Vec<InstalledItem>>,
}

impl Engine {
    /// Create an engine for an already-validated manifest.
    pub fn new(manifest: ManifestDocument, config: EngineConfig) -> EngineResult<Self> {
        let http = HttpClient::new(config.http_timeout).map_err(EngineError::Setup)?;

        Ok(Self {
            resolver: PathResolver::new(&config.install_root, config.bundle_root.clone()),
            partials: PartialStore::new(&config.install_root),
            acquirers: AcquirerSet::new(Arc::new(http)),
            system: Arc::new(HostSystem),
            status: StatusCache::new(),
            observer: None,
            downloaded: Mutex::new(Vec::new()),
            skipped: Mutex::new(Vec::new()),
            manifest,
            config,
        })
    }

    /// Load and validate a manifest file, then create an engine for it.
    ///
    /// Relative local sources resolve against the manifest's directory
    /// unless the config already names one.
    pub fn load(manifest_path: &Path, mut config: EngineConfig) -> EngineResult<Self> {
        let manifest = ManifestDocument::load(manifest_path)?;
        if config.manifest_dir.is_none() {
            if let Some(dir) = manifest_path.parent() {
                config.manifest_dir = Some(dir.to_path_buf());
            }
        }
        Self::new(manifest, config)
    }

    /// Replace the system operations (processes and filesystem mutations).
    pub fn with_system(mut self, system: Arc<dyn SystemOps>) -> Self {
        self.system = system;
        self
    }

    /// Report transfer and verification progress to `observer`.
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Override the hub credential.
    pub fn set_hf_token(&mut self, token: HfToken) {
        info!("Hub token updated");
        self.config.hf_token = Some(token);
    }

    pub fn manifest(&self) -> &ManifestDocument {
        &self.manifest
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn partials(&self) -> &PartialStore {
        &self.partials
    }

    /// Status of every non-bundled item, computed once and cached.
    pub fn check_existing_files(&self, force_recheck: bool) -> Arc<StatusMap> {
        if force_recheck {
            self.status.invalidate();
        }
        self.status.get_or_compute(|| {
            self.manifest
                .items
                .iter()
                .filter_map(|item| {
                    compute_status(item, &self.resolver, &self.partials, self.config.resume_downloads)
                        .map(|status| (item.name.clone(), status))
                })
                .collect()
        })
    }

    /// Summary of what a run would do, from the cached status.
    pub fn download_summary(&self) -> DownloadSummary {
        let status = self.check_existing_files(false);
        DownloadSummary::build(&self.manifest, &status, self.config.hf_token.is_some())
    }

    /// Acquire every item that needs it.
    ///
    /// Returns the first authentication or required-item failure. Optional
    /// item failures are logged and leave the item out of both outcome lists.
    pub fn download_items(&self, options: &DownloadOptions) -> EngineResult<DownloadReport> {
        let work = self.plan(options);
        let report = DownloadReport {
            planned: work.iter().map(|item| item.name.clone()).collect(),
            dry_run: options.dry_run,
        };

        if options.dry_run {
            self.log_dry_run(&work);
            return Ok(report);
        }
        if work.is_empty() {
            info!("Nothing to download");
            return Ok(report);
        }

        let strategy = strategy::select(options.parallel, self.config.max_workers, work.len());
        if options.parallel && work.len() > 1 && self.config.max_workers > 1 {
            info!(workers = self.config.max_workers, items = work.len(), "Starting parallel downloads");
        }

        let verify = options.verify_checksums;
        let result = strategy.execute(work.len(), &|index| self.run_item(work[index], verify));

        // The install root changed; the next status read must look again.
        self.status.invalidate();
        result.map(|()| report)
    }

    /// Filter the manifest down to the items this call will acquire.
    fn plan(&self, options: &DownloadOptions) -> Vec<&Item> {
        let status = options.skip_existing.then(|| self.check_existing_files(false));

        self.manifest
            .items
            .iter()
            .filter(|item| item.source != SourceKind::Bundled)
            .filter(|item| !options.required_only || item.required)
            .filter(|item| {
                let Some(s) = status.as_ref().and_then(|m| m.get(&item.name)) else {
                    return true;
                };
                if !s.needs_download {
                    info!(item = %item.name, reason = %s.reason, "Skipping");
                    return false;
                }
                if s.reason == StatusReason::ChecksumMismatch {
                    warn!(item = %item.name, "Re-downloading due to checksum mismatch");
                }
                true
            })
            .inspect(|item| {
                if item.gated && self.config.hf_token.is_none() {
                    warn!(item = %item.name, "Gated and no hub token set, may fail");
                }
            })
            .collect()
    }

    fn log_dry_run(&self, work: &[&Item]) {
        info!("DRY RUN - no downloads will be performed");
        for item in work {
            let destination = self
                .resolver
                .resolve(item)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(environment)".to_string());
            info!(item = %item.name, "Would download");
            info!("  Source: {}", item.source_description());
            info!("  Destination: {}", destination);
            if let Some(size) = self.resume_size(item) {
                info!("  Resume from: {:.1} MB", size as f64 / 1024.0 / 1024.0);
            }
        }
        info!(items = work.len(), "DRY RUN complete");
    }

    fn resume_size(&self, item: &Item) -> Option<u64> {
        if !self.config.resume_downloads || item.source != SourceKind::Url {
            return None;
        }
        item.path.as_deref().and_then(|p| self.partials.partial_size(p))
    }

    /// Acquire one item and apply the failure policy.
    fn run_item(&self, item: &Item, verify_checksums: bool) -> EngineResult<()> {
        let Some(acquirer) = self.acquirers.for_source(item.source) else {
            return Ok(());
        };
        let destination = self.resolver.resolve(item);
        let ctx = AcquireContext {
            item,
            dest: destination.as_deref(),
            config: &self.config,
            resolver: &self.resolver,
            partials: &self.partials,
            system: self.system.as_ref(),
            verify_checksums,
            observer: self.observer.as_ref(),
        };

        let record = || InstalledItem {
            item: item.clone(),
            destination: destination.clone(),
        };

        match acquirer.acquire(&ctx) {
            Ok(Acquired::Installed) => {
                self.downloaded.lock().push(record());
                Ok(())
            }
            Ok(Acquired::Skipped(reason)) => {
                info!(item = %item.name, reason = %reason, "Skipped");
                self.skipped.lock().push(record());
                Ok(())
            }
            Err(e) if e.is_authentication_failure() => {
                error!(item = %item.name, source = %item.source, error = %e, "Authentication failed");
                Err(EngineError::Authentication {
                    item: item.name.clone(),
                    source: e,
                })
            }
            Err(e) if item.required => {
                error!(item = %item.name, source = %item.source, error = %e, "Required item failed");
                Err(EngineError::RequiredItemFailed {
                    item: item.name.clone(),
                    source: e,
                })
            }
            Err(e) => {
                warn!(item = %item.name, source = %item.source, error = %e, "Failed to download optional item");
                Ok(())
            }
        }
    }

    /// Items acquired (transferred, copied or installed) so far.
    pub fn downloaded_items(&self) -> Vec<InstalledItem> {
        self.downloaded.lock().clone()
    }

    /// Items an acquirer found already up to date.
    pub fn skipped_items(&self) -> Vec<InstalledItem> {
        self.skipped.lock().clone()
    }

    /// Whether a restart of the host application is needed to pick up new
    /// custom nodes. Only acquired items count, never skipped ones.
    pub fn custom_nodes_were_downloaded(&self) -> bool {
        self.downloaded.lock().iter().any(InstalledItem::is_custom_node)
    }

    /// Delete every partial transfer under the install root.
    pub fn cleanup_partial_downloads(&self) -> EngineResult<usize> {
        self.partials.purge().map_err(|source| EngineError::Io {
            op: "failed to clean up",
            path: self.partials.dir().to_path_buf(),
            source,
        })
    }
}
