//! Partial-transfer store.
//!
//! In-progress URL downloads live in one side directory under the install
//! root, one file per destination. Each file name is derived from the
//! declared destination path, so concurrent transfers never share a file
//! and need no locking.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Name of the side directory under the install root.
pub const PARTIAL_DIR_NAME: &str = ".partial_downloads";

/// Extension carried by every partial file.
const PARTIAL_EXTENSION: &str = "partial";

/// Side directory of resumable downloads.
#[derive(Debug, Clone)]
pub struct PartialStore {
    dir: PathBuf,
}

impl PartialStore {
    /// Store rooted under `install_root`.
    pub fn new(install_root: &Path) -> Self {
        Self {
            dir: install_root.join(PARTIAL_DIR_NAME),
        }
    }

    /// The side directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the side directory if needed.
    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    /// Partial file for a declared destination path.
    ///
    /// Separators are flattened into the name; `%` and `:` are escaped first
    /// so two different declared paths can never share a partial file.
    pub fn partial_path_for(&self, declared: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", flatten(declared), PARTIAL_EXTENSION))
    }

    /// Size of the existing partial for `declared`, if any.
    pub fn partial_size(&self, declared: &str) -> Option<u64> {
        fs::metadata(self.partial_path_for(declared))
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
    }

    /// Delete the partial for `declared`; a missing file is not an error.
    pub fn remove(&self, declared: &str) -> io::Result<()> {
        match fs::remove_file(self.partial_path_for(declared)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Delete every partial file, returning how many were removed.
    pub fn purge(&self) -> io::Result<usize> {
        if !self.dir.exists() {
            info!("No partial downloads to clean up");
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_partial = path
                .extension()
                .map(|e| e == PARTIAL_EXTENSION)
                .unwrap_or(false);

            if is_partial && path.is_file() {
                fs::remove_file(&path)?;
                debug!(path = %path.display(), "Removed partial download");
                removed += 1;
            }
        }

        if removed > 0 {
            info!(count = removed, "Partial downloads cleaned up");
        } else {
            info!("No partial downloads to clean up");
        }
        Ok(removed)
    }
}

fn flatten(declared: &str) -> String {
    let mut out = String::with_capacity(declared.len());
    for c in declared.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '/' | '\\' => out.push_str("%2F"),
            c => out.push(c),
        }
    }
    out
}
