//! Filesystem helpers built on [`SystemOps`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use super::error::{SystemError, SystemResult};
use super::SystemOps;

/// Outcome of [`remove_dir_safely`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// The directory is gone.
    Removed,
    /// The directory could not be deleted and was moved aside.
    RenamedAside(PathBuf),
}

/// Remove a directory tree, tolerating locked or read-only files.
///
/// 1. plain recursive removal;
/// 2. clear read-only attributes across the tree and retry;
/// 3. rename the directory aside to `.backup_<name>_<id>` next to it.
///
/// Fails only when even the rename is impossible.
pub fn remove_dir_safely(sys: &dyn SystemOps, path: &Path) -> SystemResult<Removal> {
    let first = match sys.remove_dir_all(path) {
        Ok(()) => return Ok(Removal::Removed),
        Err(e) => e,
    };

    warn!(path = %path.display(), error = %first, "Retrying removal after clearing read-only flags");
    clear_readonly(path);

    if sys.remove_dir_all(path).is_ok() || !path.exists() {
        return Ok(Removal::Removed);
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dir".to_string());
    let id = Uuid::new_v4().simple().to_string();
    let backup = path.with_file_name(format!(".backup_{}_{}", name, &id[..8]));

    warn!(path = %path.display(), backup = %backup.display(), "Could not remove, renaming aside");
    sys.rename(path, &backup)
        .map_err(|e| SystemError::io("cannot remove existing directory", path, e))?;

    Ok(Removal::RenamedAside(backup))
}

fn clear_readonly(path: &Path) {
    for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
        if let Ok(meta) = entry.metadata() {
            let mut perms = meta.permissions();
            if perms.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                let _ = fs::set_permissions(entry.path(), perms);
            }
        }
    }
}

/// Copy a file or a directory tree onto `dest`, merging into existing
/// directories. Returns the number of files copied.
pub fn copy_tree(sys: &dyn SystemOps, src: &Path, dest: &Path) -> SystemResult<usize> {
    if src.is_file() {
        if let Some(parent) = dest.parent() {
            sys.create_dir_all(parent)
                .map_err(|e| SystemError::io("failed to create directory", parent, e))?;
        }
        sys.copy_file(src, dest)
            .map_err(|e| SystemError::io("failed to copy to", dest, e))?;
        return Ok(1);
    }

    let mut copied = 0;
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
            SystemError::io("failed to read", path, e.into())
        })?;

        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            sys.create_dir_all(&target)
                .map_err(|e| SystemError::io("failed to create directory", &target, e))?;
        } else {
            sys.copy_file(entry.path(), &target)
                .map_err(|e| SystemError::io("failed to copy to", &target, e))?;
            copied += 1;
        }
    }

    debug!(src = %src.display(), dest = %dest.display(), files = copied, "Copied tree");
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::HostSystem;
    use std::io;
    use tempfile::TempDir;

    /// Host system whose deletes always fail, like a Windows file lock.
    struct LockedSystem;

    impl SystemOps for LockedSystem {
        fn run(
            &self,
            spec: &crate::system::CommandSpec,
        ) -> SystemResult<crate::system::CommandOutput> {
            HostSystem.run(spec)
        }

        fn remove_dir_all(&self, _path: &Path) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
        }
    }

    #[test]
    fn test_remove_plain_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("foreign");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("sub/file.txt"), b"x").unwrap();

        assert_eq!(remove_dir_safely(&HostSystem, &dir).unwrap(), Removal::Removed);
        assert!(!dir.exists());
    }

    #[test]
    fn test_locked_directory_is_renamed_aside() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("node");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("locked.pyd"), b"x").unwrap();

        match remove_dir_safely(&LockedSystem, &dir).unwrap() {
            Removal::RenamedAside(backup) => {
                assert!(!dir.exists());
                assert!(backup.join("locked.pyd").exists());
                let name = backup.file_name().unwrap().to_string_lossy().into_owned();
                assert!(name.starts_with(".backup_node_"));
            }
            other => panic!("expected rename, got {:?}", other),
        }
    }

    #[test]
    fn test_copy_tree_merges_directories() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dest = temp.path().join("dest");
        fs::create_dir_all(src.join("a/b")).unwrap();
        fs::write(src.join("a/b/one.txt"), b"1").unwrap();
        fs::write(src.join("two.txt"), b"2").unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("existing.txt"), b"keep").unwrap();

        let copied = copy_tree(&HostSystem, &src, &dest).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(fs::read(dest.join("a/b/one.txt")).unwrap(), b"1");
        assert_eq!(fs::read(dest.join("two.txt")).unwrap(), b"2");
        assert!(dest.join("existing.txt").exists());
    }

    #[test]
    fn test_copy_single_file_creates_parent() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("model.bin");
        fs::write(&src, b"weights").unwrap();
        let dest = temp.path().join("models/checkpoints/model.bin");

        assert_eq!(copy_tree(&HostSystem, &src, &dest).unwrap(), 1);
        assert_eq!(fs::read(&dest).unwrap(), b"weights");
    }
}
