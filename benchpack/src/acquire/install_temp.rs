//! Copies out of the bundled extraction root.

use tracing::{info, warn};

use super::{AcquireContext, AcquireError, AcquireResult, Acquired, Acquirer};
use crate::system::fs::copy_tree;

/// Copies `install_temp` items from the unpacked bundle.
///
/// Bundle contents are authoritative, so the copy always runs and
/// overwrites whatever is at the destination.
pub struct InstallTempAcquirer;

impl Acquirer for InstallTempAcquirer {
    fn acquire(&self, ctx: &AcquireContext<'_>) -> AcquireResult<Acquired> {
        let item = ctx.item;
        let relative = ctx.field(&item.source_path, "source_path")?;
        let dest = ctx.destination()?;

        if ctx.resolver.bundle_root().is_none() {
            warn!(item = %item.name, "No bundle root supplied, looking under the install root");
        }

        let source = ctx.resolver.resolve_bundled(relative);
        if !source.exists() {
            return Err(AcquireError::SourceNotFound(source));
        }

        info!(item = %item.name, source = %source.display(), "Copying from bundle");
        copy_tree(ctx.system, &source, dest)?;

        info!(item = %item.name, "Copied");
        Ok(Acquired::Installed)
    }
}
