//! Blocking HTTP transfer client with resume support.
//!
//! Shared by the URL and hub acquirers:
//! - `HEAD` probes for length, range support and the hub's content digest
//! - Resumable streaming into a partial file via `Range` requests
//! - Progress callbacks for UI updates

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT_RANGES, AUTHORIZATION, CONTENT_LENGTH, RANGE};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use tracing::{debug, warn};

use super::error::{AcquireError, AcquireResult};
use crate::credential::HfToken;
use crate::progress::ProgressCallback;

/// Buffer size for reading/writing during downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Header carrying the LFS SHA-256 of a hub file.
const LINKED_ETAG: &str = "x-linked-etag";

/// Header carrying the LFS size of a hub file.
const LINKED_SIZE: &str = "x-linked-size";

/// What a `HEAD` request revealed about a remote file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteInfo {
    /// `content-length`, if advertised.
    pub content_length: Option<u64>,
    /// Whether `accept-ranges: bytes` was advertised.
    pub accepts_ranges: bool,
    /// Hub content digest (`x-linked-etag`), quotes stripped.
    pub linked_etag: Option<String>,
}

/// HTTP client for item transfers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    /// Never follows redirects; the hub puts `x-linked-*` on its 302 only.
    metadata: Client,
    timeout: Duration,
}

impl HttpClient {
    /// Create a client with the given request timeout.
    pub fn new(timeout: Duration) -> AcquireResult<Self> {
        let build = |policy: Policy| {
            Client::builder()
                .timeout(timeout)
                .redirect(policy)
                .user_agent(concat!("benchpack/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| AcquireError::Http {
                    url: String::new(),
                    reason: format!("failed to create HTTP client: {}", e),
                })
        };

        Ok(Self {
            client: build(Policy::default())?,
            metadata: build(Policy::none())?,
            timeout,
        })
    }

    /// Configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn request(&self, builder: RequestBuilder, token: Option<&HfToken>) -> RequestBuilder {
        match token {
            Some(token) => builder.header(AUTHORIZATION, token.bearer()),
            None => builder,
        }
    }

    /// Query file info via `HEAD`.
    ///
    /// The first request does not follow redirects so the hub's linked
    /// digest and size are read off its redirect. When redirected, length
    /// and range support come from a second `HEAD` that follows through to
    /// the final location.
    pub fn probe(&self, url: &str, token: Option<&HfToken>) -> AcquireResult<RemoteInfo> {
        let first = self.head(&self.metadata, url, token)?;
        let linked_etag = header_str(&first, LINKED_ETAG)
            .map(|s| s.trim().trim_matches('"').to_string())
            .filter(|s| !s.is_empty());
        let linked_size = header_str(&first, LINKED_SIZE).and_then(|s| s.trim().parse::<u64>().ok());

        let target = if first.status().is_redirection() {
            debug!(url = %url, status = %first.status(), "Following redirect for file info");
            self.head(&self.client, url, token)?
        } else {
            first
        };

        let content_length = linked_size.or_else(|| {
            target
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
        });
        let accepts_ranges = header_str(&target, ACCEPT_RANGES.as_str()) == Some("bytes");

        Ok(RemoteInfo {
            content_length,
            accepts_ranges,
            linked_etag,
        })
    }

    fn head(&self, client: &Client, url: &str, token: Option<&HfToken>) -> AcquireResult<Response> {
        let response = self
            .request(client.head(url), token)
            .send()
            .map_err(|e| self.transport_error(url, e))?;

        let status = response.status();
        check_auth(url, status)?;
        if !status.is_success() && !status.is_redirection() {
            return Err(AcquireError::Http {
                url: url.to_string(),
                reason: format!("HEAD request failed with status {}", status),
            });
        }
        Ok(response)
    }

    /// Stream `url` into `dest`, resuming at `start_byte` when non-zero.
    ///
    /// A server that answers a range request with a full `200` body restarts
    /// the file from zero. Returns the final file length.
    pub fn download(
        &self,
        url: &str,
        dest: &Path,
        start_byte: u64,
        total_size: u64,
        token: Option<&HfToken>,
        progress: Option<&ProgressCallback>,
    ) -> AcquireResult<u64> {
        let mut request = self.request(self.client.get(url), token);
        if start_byte > 0 {
            request = request.header(RANGE, format!("bytes={}-", start_byte));
        }

        let response = request.send().map_err(|e| self.transport_error(url, e))?;

        let status = response.status();
        check_auth(url, status)?;
        if start_byte > 0 && status == StatusCode::RANGE_NOT_SATISFIABLE {
            // The partial is at or past the end of the remote file.
            warn!(url = %url, start = start_byte, "Range not satisfiable, restarting download");
            return self.download(url, dest, 0, total_size, token, progress);
        }
        if !status.is_success() {
            return Err(AcquireError::Http {
                url: url.to_string(),
                reason: format!("GET request failed with status {}", status),
            });
        }

        let resuming = start_byte > 0 && status == StatusCode::PARTIAL_CONTENT;
        if start_byte > 0 && !resuming {
            warn!(url = %url, "Server ignored range request, restarting download");
        }

        let start = if resuming { start_byte } else { 0 };
        let file = open_destination(dest, resuming)?;
        self.stream(url, response, file, dest, start, total_size, progress)
    }

    #[allow(clippy::too_many_arguments)]
    fn stream(
        &self,
        url: &str,
        mut response: reqwest::blocking::Response,
        file: File,
        dest: &Path,
        start_byte: u64,
        total_size: u64,
        progress: Option<&ProgressCallback>,
    ) -> AcquireResult<u64> {
        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut downloaded = start_byte;

        loop {
            let bytes_read = response.read(&mut buffer).map_err(|e| AcquireError::Http {
                url: url.to_string(),
                reason: format!("read error: {}", e),
            })?;

            if bytes_read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| AcquireError::io("failed to write", dest, e))?;

            downloaded += bytes_read as u64;

            if let Some(cb) = progress {
                cb(downloaded, total_size);
            }
        }

        writer
            .flush()
            .map_err(|e| AcquireError::io("failed to write", dest, e))?;

        debug!(url = %url, bytes = downloaded, "Download stream complete");
        Ok(downloaded)
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> AcquireError {
        if e.is_timeout() {
            AcquireError::Timeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            }
        } else {
            AcquireError::Http {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

fn check_auth(url: &str, status: StatusCode) -> AcquireResult<()> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(AcquireError::Authentication {
            url: url.to_string(),
            message: format!(
                "status {}; the file may be gated, set HF_TOKEN to a token with access",
                status.as_u16()
            ),
        });
    }
    Ok(())
}

fn open_destination(dest: &Path, append: bool) -> AcquireResult<File> {
    if append {
        return OpenOptions::new()
            .append(true)
            .open(dest)
            .map_err(|e| AcquireError::io("failed to open", dest, e));
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AcquireError::io("failed to create directory", parent, e))?;
    }
    File::create(dest).map_err(|e| AcquireError::io("failed to create", dest, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_keeps_timeout() {
        let client = HttpClient::new(Duration::from_secs(60)).unwrap();
        assert_eq!(client.timeout().as_secs(), 60);
    }

    #[test]
    fn test_auth_statuses() {
        assert!(check_auth("u", StatusCode::UNAUTHORIZED)
            .unwrap_err()
            .is_authentication_failure());
        assert!(check_auth("u", StatusCode::FORBIDDEN).is_err());
        assert!(check_auth("u", StatusCode::NOT_FOUND).is_ok());
    }

    #[test]
    fn test_open_destination_truncates_unless_appending() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("nested/file.partial");

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"old").unwrap();

        {
            let mut f = open_destination(&path, true).unwrap();
            f.write_all(b"+more").unwrap();
        }
        assert_eq!(fs::read(&path).unwrap(), b"old+more");

        drop(open_destination(&path, false).unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"");
    }
}
