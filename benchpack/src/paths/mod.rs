//! Path resolution for manifest items.
//!
//! An item's declared `path` is joined onto the directory selected by its
//! `path_base`:
//!
//! | base           | root                                           |
//! |----------------|------------------------------------------------|
//! | `comfyui`      | install root                                   |
//! | `home`         | user home directory                            |
//! | `temp`         | platform temp directory                        |
//! | `appdata`      | platform application-data directory            |
//! | `absolute`     | none, the path is used verbatim                |
//! | `install_temp` | bundled extraction root (install root if unset)|
//!
//! Joins fall back to case-insensitive matching when the exact path is
//! missing (see [`resolve_case_insensitive`]).

mod casefold;
pub mod partial;

use std::env;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::manifest::{Item, PathBase};

pub use casefold::resolve_case_insensitive;
pub use partial::PartialStore;

/// Maps manifest items to concrete filesystem locations.
#[derive(Debug, Clone)]
pub struct PathResolver {
    install_root: PathBuf,
    bundle_root: Option<PathBuf>,
    home: Option<PathBuf>,
    temp: PathBuf,
    appdata: Option<PathBuf>,
}

impl PathResolver {
    /// Resolver using the platform's home, temp and app-data directories.
    pub fn new(install_root: impl Into<PathBuf>, bundle_root: Option<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            bundle_root,
            home: dirs::home_dir(),
            temp: env::temp_dir(),
            appdata: dirs::data_dir(),
        }
    }

    /// Override the home directory.
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Override the temp directory.
    pub fn with_temp(mut self, temp: impl Into<PathBuf>) -> Self {
        self.temp = temp.into();
        self
    }

    /// Override the application-data directory.
    pub fn with_appdata(mut self, appdata: impl Into<PathBuf>) -> Self {
        self.appdata = Some(appdata.into());
        self
    }

    /// The install root.
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// The bundled extraction root, if one was supplied.
    pub fn bundle_root(&self) -> Option<&Path> {
        self.bundle_root.as_deref()
    }

    /// Destination of an item, `None` for items without a declared path.
    pub fn resolve(&self, item: &Item) -> Option<PathBuf> {
        item.path
            .as_deref()
            .map(|declared| self.resolve_path(declared, item.path_base))
    }

    /// Resolve a declared path against a base.
    pub fn resolve_path(&self, declared: &str, base: PathBase) -> PathBuf {
        if base == PathBase::Absolute {
            return PathBuf::from(declared);
        }
        resolve_case_insensitive(&self.base_dir(base), declared)
    }

    /// Resolve a path inside the bundled extraction root.
    pub fn resolve_bundled(&self, relative: &str) -> PathBuf {
        self.resolve_path(relative, PathBase::InstallTemp)
    }

    /// Directory a base stands for.
    ///
    /// Bases whose directory is unavailable degrade to the install root with
    /// a warning rather than failing; they usually carry optional bundles.
    pub fn base_dir(&self, base: PathBase) -> PathBuf {
        let fallback = |what: &str| {
            warn!(
                base = what,
                root = %self.install_root.display(),
                "Directory unavailable, falling back to install root"
            );
            self.install_root.clone()
        };

        match base {
            PathBase::Comfyui | PathBase::Absolute => self.install_root.clone(),
            PathBase::Temp => self.temp.clone(),
            PathBase::Home => self.home.clone().unwrap_or_else(|| fallback("home")),
            PathBase::Appdata => self.appdata.clone().unwrap_or_else(|| fallback("appdata")),
            PathBase::InstallTemp => self
                .bundle_root
                .clone()
                .unwrap_or_else(|| fallback("install_temp")),
        }
    }
}
