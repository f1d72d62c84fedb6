//! Copies from arbitrary local paths.

use tracing::info;

use super::{resolve_local_source, AcquireContext, AcquireError, AcquireResult, Acquired, Acquirer};
use crate::system::fs::copy_tree;

/// Copies `local` items: a file, or a directory merged recursively.
pub struct LocalAcquirer;

impl Acquirer for LocalAcquirer {
    fn acquire(&self, ctx: &AcquireContext<'_>) -> AcquireResult<Acquired> {
        let item = ctx.item;
        let raw = ctx.field(&item.source_path, "source_path")?;
        let dest = ctx.destination()?;

        let source = resolve_local_source(raw, ctx.config.manifest_dir.as_deref())
            .ok_or_else(|| AcquireError::SourceNotFound(raw.into()))?;

        info!(item = %item.name, source = %source.display(), "Copying from local path");
        let files = copy_tree(ctx.system, &source, dest)?;

        info!(item = %item.name, files, "Copied");
        Ok(Acquired::Installed)
    }
}
