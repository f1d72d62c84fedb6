//! Windows package manager installs.

use tracing::{info, warn};

use super::{AcquireContext, AcquireError, AcquireResult, Acquired, Acquirer};
use crate::system::CommandSpec;

/// Installs `winget` items. Windows only.
pub struct WingetAcquirer;

impl Acquirer for WingetAcquirer {
    fn acquire(&self, ctx: &AcquireContext<'_>) -> AcquireResult<Acquired> {
        let item = ctx.item;
        let package_id = ctx.field(&item.package_id, "package_id")?;

        if !ctx.system.is_windows() {
            if item.required {
                return Err(AcquireError::UnsupportedPlatform(format!("winget package {}", package_id)));
            }
            warn!(item = %item.name, "winget is only available on Windows, skipping");
            return Ok(Acquired::Skipped("winget unavailable on this platform".to_string()));
        }

        let mut spec = CommandSpec::new("winget").args(["install", "--id", package_id]);
        if let Some(source) = item.winget_source.as_deref() {
            spec = spec.args(["--source", source]);
        }
        if item.silent {
            spec = spec.arg("--silent");
        }
        if item.accept_agreements {
            spec = spec.args(["--accept-package-agreements", "--accept-source-agreements"]);
        }
        let spec = spec.timeout(ctx.config.timeouts.os_package);

        info!(item = %item.name, package_id = %package_id, "Installing with winget");
        ctx.system.run(&spec)?;

        info!(item = %item.name, "Installed");
        Ok(Acquired::Installed)
    }
}
