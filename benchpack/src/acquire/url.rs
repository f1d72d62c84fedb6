//! Direct URL downloads through the partial-transfer store.

use std::sync::Arc;

use tracing::{debug, info};

use super::{AcquireContext, AcquireError, AcquireResult, Acquired, Acquirer, HttpClient, RemoteInfo};
use crate::checksum;
use crate::progress;

/// Downloads `url` items, resuming interrupted transfers.
///
/// The stream always lands in the item's partial file first and is moved
/// onto the destination only once complete (and verified, when eligible), so
/// an interrupted run never leaves a truncated file at the final path.
pub struct UrlAcquirer {
    http: Arc<HttpClient>,
}

impl UrlAcquirer {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

impl Acquirer for UrlAcquirer {
    fn acquire(&self, ctx: &AcquireContext<'_>) -> AcquireResult<Acquired> {
        let item = ctx.item;
        let url = ctx.field(&item.url, "url")?;
        let declared = ctx.field(&item.path, "path")?;
        let dest = ctx.destination()?;

        info!(item = %item.name, url = %url, "Downloading from URL");

        let remote = self.http.probe(url, None).unwrap_or_else(|e| {
            debug!(url = %url, error = %e, "HEAD failed, size and range support unknown");
            RemoteInfo::default()
        });
        let total = remote.content_length.unwrap_or(0);

        ctx.partials
            .ensure_dir()
            .map_err(|e| AcquireError::io("failed to create", ctx.partials.dir(), e))?;
        let partial = ctx.partials.partial_path_for(declared);

        let existing = if ctx.config.resume_downloads && remote.accepts_ranges {
            ctx.partials.partial_size(declared).unwrap_or(0)
        } else {
            0
        };

        let expected = item.checksum().filter(|_| ctx.should_verify());
        let full_length = existing > 0 && remote.content_length == Some(existing);

        // A full-length partial is only trusted when its digest checks out.
        let reused = match expected {
            Some(expected) if full_length => checksum::verify(&partial, expected),
            _ => false,
        };

        if reused {
            info!(item = %item.name, "Partial download already complete and verified");
        } else {
            let start = match remote.content_length {
                Some(len) if existing >= len => 0,
                _ => existing,
            };
            if full_length {
                info!(item = %item.name, "Full-length partial could not be verified, downloading again");
            } else if start > 0 {
                info!(
                    item = %item.name,
                    "Resuming from {:.1}MB",
                    start as f64 / 1024.0 / 1024.0
                );
            }

            let cb = progress::begin(ctx.observer, &item.name, total);
            let result = self.http.download(url, &partial, start, total, None, cb.as_ref());
            if let Some(observer) = ctx.observer {
                observer.finish(&item.name);
            }
            result?;

            if let Some(expected) = expected {
                if let Err(e) = ctx.verify_file(&partial, expected) {
                    // Bad bytes must not seed a later resume.
                    let _ = ctx.partials.remove(declared);
                    return Err(e);
                }
            }
        }

        ctx.place_file(&partial, dest)?;

        if item.executable {
            ctx.system
                .set_executable(dest)
                .map_err(|e| AcquireError::io("failed to set permissions on", dest, e))?;
        }

        ctx.partials
            .remove(declared)
            .map_err(|e| AcquireError::io("failed to remove", &partial, e))?;

        info!(item = %item.name, "Downloaded");
        Ok(Acquired::Installed)
    }
}
