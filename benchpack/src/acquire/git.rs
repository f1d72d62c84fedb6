//! Git clone/update.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use super::pip;
use super::{AcquireContext, AcquireResult, Acquired, Acquirer};
use crate::system::fs::{remove_dir_safely, Removal};
use crate::system::{CommandSpec, SystemResult};

const GIT: &str = "git";

/// Where a checkout stands relative to the remote ref.
#[derive(Debug, PartialEq, Eq)]
enum RemoteState {
    UpToDate,
    Behind { local: String, remote: String },
    RefMissing,
}

/// Clones or updates `git` items.
///
/// - destination absent: shallow single-branch clone;
/// - destination present but not a repository: remove it, then clone;
/// - repository: compare `HEAD` with the remote ref and update only when
///   they differ. Any failed update falls back to a fresh clone.
pub struct GitAcquirer;

impl GitAcquirer {
    fn clone_fresh(ctx: &AcquireContext<'_>, url: &str, git_ref: &str, dest: &Path) -> AcquireResult<()> {
        ctx.ensure_parent(dest)?;
        info!(item = %ctx.item.name, url = %url, git_ref = %git_ref, "Cloning");

        let spec = CommandSpec::new(GIT)
            .args(["clone", "--depth", "1", "--branch", git_ref, url])
            .arg(dest.as_os_str())
            .timeout(ctx.config.timeouts.clone);
        ctx.system.run(&spec)?;

        info!(item = %ctx.item.name, "Cloned");
        Ok(())
    }

    fn remove_foreign(ctx: &AcquireContext<'_>, dest: &Path) -> AcquireResult<()> {
        if let Removal::RenamedAside(backup) = remove_dir_safely(ctx.system, dest)? {
            warn!(
                item = %ctx.item.name,
                backup = %backup.display(),
                "Old directory was locked and has been moved aside"
            );
        }
        Ok(())
    }

    fn remote_state(ctx: &AcquireContext<'_>, url: &str, git_ref: &str, dest: &Path) -> SystemResult<RemoteState> {
        let timeouts = &ctx.config.timeouts;

        let local = ctx
            .system
            .run(
                &CommandSpec::new(GIT)
                    .args(["rev-parse", "HEAD"])
                    .current_dir(dest)
                    .timeout(timeouts.local_query),
            )?
            .stdout
            .trim()
            .to_string();

        let listing = ctx.system.run(
            &CommandSpec::new(GIT)
                .args(["ls-remote", url, git_ref])
                .timeout(timeouts.remote_query),
        )?;

        let Some(remote) = listing.stdout.split_whitespace().next().map(str::to_string) else {
            return Ok(RemoteState::RefMissing);
        };

        if local == remote {
            Ok(RemoteState::UpToDate)
        } else {
            Ok(RemoteState::Behind { local, remote })
        }
    }

    fn update(ctx: &AcquireContext<'_>, git_ref: &str, dest: &Path) -> SystemResult<()> {
        let timeouts = &ctx.config.timeouts;
        let git = |args: &[&str], timeout: Duration| {
            ctx.system.run(
                &CommandSpec::new(GIT)
                    .args(args.iter().copied())
                    .current_dir(dest)
                    .timeout(timeout),
            )
        };

        git(&["fetch", "origin"], timeouts.fetch)?;
        git(&["checkout", git_ref], timeouts.checkout)?;

        // Branches reset to the remote-tracking ref, tags and commits to themselves.
        let tracking = format!("origin/{}", git_ref);
        if git(&["reset", "--hard", tracking.as_str()], timeouts.checkout).is_err() {
            git(&["reset", "--hard", git_ref], timeouts.checkout)?;
        }
        Ok(())
    }

    fn update_or_reclone(ctx: &AcquireContext<'_>, url: &str, git_ref: &str, dest: &Path) -> AcquireResult<()> {
        match Self::update(ctx, git_ref, dest) {
            Ok(()) => {
                info!(item = %ctx.item.name, "Updated");
                Ok(())
            }
            Err(e) => {
                warn!(item = %ctx.item.name, error = %e, "Git update failed, re-cloning");
                Self::remove_foreign(ctx, dest)?;
                Self::clone_fresh(ctx, url, git_ref, dest)
            }
        }
    }

    fn install_requirements(ctx: &AcquireContext<'_>, dest: &Path) -> AcquireResult<()> {
        if !ctx.item.install_requirements {
            return Ok(());
        }
        let requirements = dest.join("requirements.txt");
        if !requirements.is_file() {
            return Ok(());
        }

        info!(item = %ctx.item.name, "Installing requirements");
        let args = vec![
            "install".into(),
            "-r".into(),
            requirements.into_os_string(),
        ];
        match pip::run_pip(ctx, args) {
            Ok(()) => {
                info!(item = %ctx.item.name, "Requirements installed");
                Ok(())
            }
            Err(e) if ctx.item.required => Err(e),
            Err(e) => {
                warn!(item = %ctx.item.name, error = %e, "Requirements installation failed");
                Ok(())
            }
        }
    }
}

impl Acquirer for GitAcquirer {
    fn acquire(&self, ctx: &AcquireContext<'_>) -> AcquireResult<Acquired> {
        let item = ctx.item;
        let url = ctx.field(&item.url, "url")?;
        let dest = ctx.destination()?;
        let git_ref = item.git_ref();

        if !dest.exists() {
            Self::clone_fresh(ctx, url, git_ref, dest)?;
        } else if !dest.join(".git").exists() {
            info!(item = %item.name, path = %dest.display(), "Removing non-git directory");
            Self::remove_foreign(ctx, dest)?;
            Self::clone_fresh(ctx, url, git_ref, dest)?;
        } else {
            info!(item = %item.name, "Checking repository version");
            match Self::remote_state(ctx, url, git_ref, dest) {
                Ok(RemoteState::UpToDate) => {
                    info!(item = %item.name, git_ref = %git_ref, "Already up to date");
                    return Ok(Acquired::Skipped(format!("already at {}", git_ref)));
                }
                Ok(RemoteState::Behind { local, remote }) => {
                    info!(
                        item = %item.name,
                        "Updating from {} to {}",
                        short(&local),
                        short(&remote)
                    );
                    Self::update_or_reclone(ctx, url, git_ref, dest)?;
                }
                Ok(RemoteState::RefMissing) => {
                    warn!(item = %item.name, git_ref = %git_ref, "Ref not found on remote, re-cloning");
                    Self::remove_foreign(ctx, dest)?;
                    Self::clone_fresh(ctx, url, git_ref, dest)?;
                }
                Err(e) => {
                    warn!(item = %item.name, error = %e, "Could not verify version, attempting update");
                    Self::update_or_reclone(ctx, url, git_ref, dest)?;
                }
            }
        }

        Self::install_requirements(ctx, dest)?;
        Ok(Acquired::Installed)
    }
}

fn short(commit: &str) -> &str {
    commit.get(..8).unwrap_or(commit)
}
