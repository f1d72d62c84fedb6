//! SHA-256 checksum calculation for file verification.
//!
//! Files are streamed in fixed-size blocks; nothing is loaded whole. A
//! mismatch or a missing file is a normal outcome and yields `false`, never
//! an error.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::progress::ProgressCallback;

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Files above this size report incremental progress (100MB).
pub const PROGRESS_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Calculate the lowercase hex SHA-256 of a file.
pub fn calculate_file_checksum(path: &Path) -> io::Result<String> {
    calculate_with_progress(path, None)
}

/// Calculate the SHA-256 of a file, reporting `(bytes_hashed, total)` to
/// `progress` when the file is larger than [`PROGRESS_THRESHOLD`].
pub fn calculate_with_progress(
    path: &Path,
    progress: Option<&ProgressCallback>,
) -> io::Result<String> {
    let mut file = File::open(path)?;
    let total = file.metadata()?.len();
    let progress = progress.filter(|_| total > PROGRESS_THRESHOLD);

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut hashed = 0u64;

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
        hashed += bytes_read as u64;

        if let Some(cb) = progress {
            cb(hashed, total);
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare two hex digests, ignoring case and surrounding whitespace.
pub fn digests_match(actual: &str, expected: &str) -> bool {
    actual.trim().eq_ignore_ascii_case(expected.trim())
}

/// Verify that a file matches an expected SHA-256 digest.
pub fn verify(path: &Path, expected: &str) -> bool {
    verify_with_progress(path, expected, None)
}

/// [`verify`] with large-file progress reporting.
pub fn verify_with_progress(
    path: &Path,
    expected: &str,
    progress: Option<&ProgressCallback>,
) -> bool {
    if !path.is_file() {
        return false;
    }

    match calculate_with_progress(path, progress) {
        Ok(actual) => digests_match(&actual, expected),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Checksum read failed");
            false
        }
    }
}
