//! System operations seam.
//!
//! Every process spawn and filesystem mutation an acquirer performs goes
//! through [`SystemOps`], so tests can script git, pip and winget without
//! touching the real tools. Filesystem methods default to `std::fs`; a fake
//! usually overrides only [`SystemOps::run`].
//!
//! Two writers stay outside the seam and use `std::fs` directly: the HTTP
//! client streaming bytes into a partial or scratch file, and
//! [`PartialStore`](crate::paths::PartialStore) managing its own directory.

mod error;
pub mod fs;
mod process;

use std::fs as stdfs;
use std::io;
use std::path::Path;

pub use error::{SystemError, SystemResult};
pub use process::{CommandOutput, CommandSpec};

/// Process and filesystem operations used by acquirers.
pub trait SystemOps: Send + Sync {
    /// Run a process to completion.
    fn run(&self, spec: &CommandSpec) -> SystemResult<CommandOutput>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        stdfs::create_dir_all(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        stdfs::remove_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        stdfs::remove_file(path)
    }

    /// Move a file or directory, copying across filesystems when needed.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        match stdfs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(_) if from.is_file() => {
                stdfs::copy(from, to)?;
                stdfs::remove_file(from)
            }
            Err(e) => Err(e),
        }
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        stdfs::copy(from, to)
    }

    /// Mark a file executable (`0o755`); a no-op off Unix.
    fn set_executable(&self, path: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            stdfs::set_permissions(path, stdfs::Permissions::from_mode(0o755))
        }
        #[cfg(not(unix))]
        {
            let _ = path;
            Ok(())
        }
    }

    /// Whether the host is Windows (gates the winget acquirer).
    fn is_windows(&self) -> bool {
        cfg!(windows)
    }
}

/// The real host.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostSystem;

impl SystemOps for HostSystem {
    fn run(&self, spec: &CommandSpec) -> SystemResult<CommandOutput> {
        process::run_command(spec)
    }
}
