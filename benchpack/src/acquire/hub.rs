//! Model hub downloads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AcquireContext, AcquireError, AcquireResult, Acquired, Acquirer, HttpClient};
use crate::checksum;
use crate::progress;

const DEFAULT_REVISION: &str = "main";

/// Split a hub `remote_path` into `(revision, subfolder)`.
///
/// Recognises `…/tree/<revision>/<subfolder…>`; anything else yields the
/// default revision and no subfolder.
pub fn parse_remote_path(remote_path: Option<&str>) -> (String, Option<String>) {
    let Some(rest) = remote_path.and_then(|p| p.split_once("/tree/").map(|(_, rest)| rest)) else {
        return (DEFAULT_REVISION.to_string(), None);
    };

    let rest = rest.trim_matches('/');
    let (revision, subfolder) = match rest.split_once('/') {
        Some((rev, sub)) => (rev, Some(sub.trim_matches('/'))),
        None => (rest, None),
    };

    let revision = if revision.is_empty() {
        DEFAULT_REVISION
    } else {
        revision
    };
    let subfolder = subfolder.filter(|s| !s.is_empty()).map(str::to_string);
    (revision.to_string(), subfolder)
}

/// Downloads `huggingface` items via the hub's resolve endpoint.
pub struct HubAcquirer {
    http: Arc<HttpClient>,
}

impl HubAcquirer {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    fn resolve_url(endpoint: &str, repo: &str, revision: &str, repo_file: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            endpoint.trim_end_matches('/'),
            repo.trim_matches('/'),
            revision,
            repo_file.trim_start_matches('/')
        )
    }

    fn fetch_into(
        &self,
        ctx: &AcquireContext<'_>,
        url: &str,
        scratch: &Path,
        dest: &Path,
        total: u64,
    ) -> AcquireResult<()> {
        let file_name = dest
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("download"));
        let staged = scratch.join(file_name);

        let token = ctx.config.hf_token.as_ref();
        let cb = progress::begin(ctx.observer, &ctx.item.name, total);
        let result = self.http.download(url, &staged, 0, total, token, cb.as_ref());
        if let Some(observer) = ctx.observer {
            observer.finish(&ctx.item.name);
        }
        result?;

        ctx.place_file(&staged, dest)
    }
}

impl Acquirer for HubAcquirer {
    fn acquire(&self, ctx: &AcquireContext<'_>) -> AcquireResult<Acquired> {
        let item = ctx.item;
        let repo = ctx.field(&item.repo, "repo")?;
        let file = ctx.field(&item.file, "file")?;
        let dest = ctx.destination()?;

        info!(item = %item.name, repo = %repo, file = %file, "Downloading from hub");

        let token = ctx.config.hf_token.as_ref();
        if item.gated && token.is_none() {
            warn!(
                item = %item.name,
                "Gated model and no HF_TOKEN configured; the download will likely be refused"
            );
        }

        let (revision, subfolder) = parse_remote_path(item.remote_path.as_deref());
        let repo_file = match &subfolder {
            Some(sub) => format!("{}/{}", sub, file),
            None => file.to_string(),
        };
        let url = Self::resolve_url(&ctx.config.hub_endpoint, repo, &revision, &repo_file);

        // Remote digest is only a cross-check; lookup failures are ignored.
        let remote = self.http.probe(&url, token).ok();
        let remote_checksum = remote.as_ref().and_then(|r| r.linked_etag.clone());
        if let Some(digest) = &remote_checksum {
            debug!(item = %item.name, remote = %digest, "Remote checksum");
        }
        let total = remote.and_then(|r| r.content_length).unwrap_or(0);

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        let id = Uuid::new_v4().simple().to_string();
        let scratch = parent.join(format!(".tmp_hub_{}", &id[..8]));
        ctx.system
            .create_dir_all(&scratch)
            .map_err(|e| AcquireError::io("failed to create", &scratch, e))?;

        let result = self.fetch_into(ctx, &url, &scratch, dest, total);

        // Hub-side layout never survives, success or not.
        if let Err(e) = ctx.system.remove_dir_all(&scratch) {
            debug!(path = %scratch.display(), error = %e, "Failed to remove scratch directory");
        }
        result?;

        if ctx.should_verify() {
            let manifest_checksum = item.checksum();
            if let Some(expected) = manifest_checksum.or(remote_checksum.as_deref()) {
                ctx.verify_file(dest, expected)?;

                if let (Some(manifest), Some(remote)) = (manifest_checksum, &remote_checksum) {
                    digests_disagree(&item.name, manifest, remote);
                }
                info!(item = %item.name, "Downloaded and verified");
                return Ok(Acquired::Installed);
            }
        }

        info!(item = %item.name, "Downloaded");
        Ok(Acquired::Installed)
    }
}

/// Warn when the manifest pins a different digest than the hub reports.
fn digests_disagree(item: &str, manifest: &str, remote: &str) -> bool {
    if checksum::digests_match(manifest, remote) {
        return false;
    }
    warn!(
        item = %item,
        manifest = %manifest,
        remote = %remote,
        "Manifest checksum differs from remote"
    );
    true
}
