//! Runtime-package installs through `python -m pip`.

use std::ffi::OsString;
use std::path::PathBuf;
use std::thread;

use tracing::{info, warn};

use super::{resolve_local_source, AcquireContext, AcquireError, AcquireResult, Acquired, Acquirer};
use crate::manifest::PathBase;
use crate::system::{CommandSpec, SystemError};

/// Failure signatures of a file held open by another process.
const LOCK_SIGNATURES: [&str; 4] = [
    "WinError 32",
    "WinError 5",
    "being used by another process",
    "Access is denied",
];

/// Whether a failed command looks like a transient file lock.
pub fn is_transient_lock(err: &SystemError) -> bool {
    let stderr = err.stderr();
    LOCK_SIGNATURES.iter().any(|sig| stderr.contains(sig))
}

/// Run `python -m pip <args>`, retrying transient lock failures.
pub(crate) fn run_pip(ctx: &AcquireContext<'_>, args: Vec<OsString>) -> AcquireResult<()> {
    let spec = CommandSpec::new(ctx.config.python_executable.as_os_str())
        .args(["-m", "pip"])
        .args(args)
        .timeout(ctx.config.timeouts.install);

    let policy = ctx.config.lock_retry;
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        match ctx.system.run(&spec) {
            Ok(_) => return Ok(()),
            Err(e) if is_transient_lock(&e) => {
                attempt += 1;
                if attempt >= attempts {
                    return Err(AcquireError::TransientLock { attempts, source: e });
                }
                let delay = policy.delay_after(attempt - 1);
                warn!(
                    item = %ctx.item.name,
                    attempt,
                    "Files locked by another process, retrying in {:?}",
                    delay
                );
                thread::sleep(delay);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Installs `pip` items into the configured interpreter's environment.
pub struct PipAcquirer;

impl PipAcquirer {
    /// What to hand pip: `name==version`, `name`, or a wheel path.
    fn install_target(ctx: &AcquireContext<'_>) -> AcquireResult<OsString> {
        let item = ctx.item;

        if let Some(source) = item.source_path.as_deref().filter(|s| !s.trim().is_empty()) {
            let wheel = if item.path_base == PathBase::InstallTemp {
                Some(ctx.resolver.resolve_bundled(source)).filter(|p| p.exists())
            } else {
                resolve_local_source(source, ctx.config.manifest_dir.as_deref())
            };
            return wheel
                .map(PathBuf::into_os_string)
                .ok_or_else(|| AcquireError::SourceNotFound(PathBuf::from(source)));
        }

        let package = ctx.field(&item.package, "package")?;
        let spec = match item.version.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() && v != "latest" => format!("{}=={}", package, v),
            _ => package.to_string(),
        };
        Ok(spec.into())
    }

    fn install_args(ctx: &AcquireContext<'_>, target: OsString) -> Vec<OsString> {
        let item = ctx.item;
        let mut args: Vec<OsString> = vec!["install".into()];

        if let Some(url) = &item.index_url {
            args.push("--index-url".into());
            args.push(url.into());
        }
        if let Some(url) = &item.extra_index_url {
            args.push("--extra-index-url".into());
            args.push(url.into());
        }
        if let Some(links) = &item.find_links {
            args.push("--find-links".into());
            args.push(links.into());
        }
        args.extend(item.pip_args.iter().map(OsString::from));
        args.push(target);
        args
    }

    fn uninstall(ctx: &AcquireContext<'_>) -> AcquireResult<()> {
        let package = ctx.field(&ctx.item.package, "package")?;
        info!(item = %ctx.item.name, package = %package, "Uninstalling current version");
        run_pip(ctx, vec!["uninstall".into(), "-y".into(), package.into()])
    }
}

impl Acquirer for PipAcquirer {
    fn acquire(&self, ctx: &AcquireContext<'_>) -> AcquireResult<Acquired> {
        let item = ctx.item;

        if item.uninstall_current || item.uninstall_only {
            Self::uninstall(ctx)?;
            if item.uninstall_only {
                info!(item = %item.name, "Uninstalled");
                return Ok(Acquired::Installed);
            }
        }

        let target = Self::install_target(ctx)?;
        info!(item = %item.name, target = %target.to_string_lossy(), "Installing package");
        run_pip(ctx, Self::install_args(ctx, target))?;

        info!(item = %item.name, "Installed");
        Ok(Acquired::Installed)
    }
}
