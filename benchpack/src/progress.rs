//! Transfer progress reporting.
//!
//! The library never draws anything itself. Long transfers (HTTP streams,
//! large-file hashing) ask an optional [`ProgressObserver`] for a callback
//! and feed it byte counts; the CLI renders those as progress bars.

use std::sync::Arc;

/// Progress callback for a single transfer.
///
/// # Arguments
///
/// * `done` - Bytes transferred (or hashed) so far
/// * `total` - Total expected bytes, 0 when unknown
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Source of per-transfer progress callbacks.
pub trait ProgressObserver: Send + Sync {
    /// Begin tracking a transfer; the returned callback receives updates.
    fn begin(&self, label: &str, total: u64) -> ProgressCallback;

    /// The transfer identified by `label` has ended (successfully or not).
    fn finish(&self, _label: &str) {}
}

/// Shared handle to an observer.
pub type SharedObserver = Arc<dyn ProgressObserver>;

/// Start a callback from an optional observer.
pub(crate) fn begin(
    observer: Option<&SharedObserver>,
    label: &str,
    total: u64,
) -> Option<ProgressCallback> {
    observer.map(|o| o.begin(label, total))
}
