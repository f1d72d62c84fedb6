//! Case-insensitive path lookup.
//!
//! Archive contents keep their exact case while manifests may not, so when
//! the exact join is missing the tree is walked one component at a time,
//! matching names without regard to case.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Split a declared relative path on either separator, dropping empty and
/// `.` components.
pub(crate) fn split_declared(relative: &str) -> Vec<&str> {
    relative
        .split(['/', '\\'])
        .filter(|p| !p.is_empty() && *p != ".")
        .collect()
}

/// Join `relative` onto `base`, falling back to case-insensitive matching.
///
/// Components that cannot be matched at all are appended verbatim, so the
/// result is always usable as a creation target.
pub fn resolve_case_insensitive(base: &Path, relative: &str) -> PathBuf {
    let parts = split_declared(relative);

    let exact = parts.iter().fold(base.to_path_buf(), |acc, p| acc.join(p));
    if exact.exists() {
        return exact;
    }

    let mut current = base.to_path_buf();
    for (i, part) in parts.iter().enumerate() {
        let candidate = current.join(part);
        if candidate.exists() {
            current = candidate;
            continue;
        }

        match find_entry(&current, part) {
            Some(found) => current = found,
            None => {
                for rest in &parts[i..] {
                    current.push(rest);
                }
                return current;
            }
        }
    }

    debug!(
        declared = relative,
        resolved = %current.display(),
        "Resolved path case-insensitively"
    );
    current
}

/// Find the entry of `dir` whose name equals `name` ignoring case.
///
/// Several matches are possible on case-sensitive filesystems; the
/// lexicographically smallest exact name wins and the choice is logged.
fn find_entry(dir: &Path, name: &str) -> Option<PathBuf> {
    let wanted = name.to_lowercase();

    let mut matches: Vec<OsString> = fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.file_name())
        .filter(|n| n.to_string_lossy().to_lowercase() == wanted)
        .collect();

    matches.sort();
    let chosen = matches.first()?.clone();

    if matches.len() > 1 {
        warn!(
            dir = %dir.display(),
            wanted = name,
            chosen = %chosen.to_string_lossy(),
            candidates = matches.len(),
            "Several entries differ only by case, picking the first"
        );
    }

    Some(dir.join(chosen))
}
