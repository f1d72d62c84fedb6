//! Cleanup command - delete partial downloads under the install root.

use std::path::Path;

use benchpack::paths::PartialStore;

use crate::error::CliError;

/// Purge every partial download and report the count.
pub fn run(install_root: &Path) -> Result<(), CliError> {
    let store = PartialStore::new(install_root);
    println!("Cleaning partial downloads in: {}", store.dir().display());

    let removed = store
        .purge()
        .map_err(|e| CliError::Cleanup(format!("{}: {}", store.dir().display(), e)))?;

    if removed == 0 {
        println!("No partial downloads to clean up");
    } else {
        println!("Deleted {} partial download(s)", removed);
    }
    Ok(())
}
