//! Streaming downloader with host-specific URL resolution.
//!
//! The download loop itself is host-agnostic: resolvers map share links to
//! direct URLs up front, and the one host-specific wrinkle that survives is
//! the "confirm large file" interstitial some hosts serve instead of
//! content, followed here as an explicit bounded loop driven by the
//! matching resolver. Bodies stream to a `.part` sibling with a byte
//! ceiling enforced before and during the transfer, then rename into place.

pub mod resolvers;

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use sandboxed_path::{PathSandbox, sanitize_name};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::errors::DownloadError;
pub use resolvers::{GoogleDriveResolver, MediafireResolver, UrlResolver};

/// Interstitial confirm pages are followed at most this many times. A host
/// serving an endless chain of them must not turn into unbounded recursion.
const MAX_CONFIRM_HOPS: usize = 3;

pub struct Downloader {
    client: Client,
    sandbox: PathSandbox,
    resolvers: Vec<Box<dyn UrlResolver>>,
    byte_limit: u64,
}

impl Downloader {
    /// Build a downloader over `sandbox` with a size ceiling of
    /// `byte_limit`. Only the connection is timed out; long transfers are
    /// bounded by the byte ceiling, not the clock.
    pub fn new(
        sandbox: PathSandbox,
        byte_limit: u64,
        connect_timeout: Duration,
    ) -> Result<Self, DownloadError> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        let resolvers: Vec<Box<dyn UrlResolver>> = vec![
            Box::new(GoogleDriveResolver),
            Box::new(MediafireResolver::new(client.clone())),
        ];
        Ok(Self {
            client,
            sandbox,
            resolvers,
            byte_limit,
        })
    }

    /// Like [`Downloader::new`] but with a caller-supplied resolver set.
    pub fn with_resolvers(
        sandbox: PathSandbox,
        byte_limit: u64,
        connect_timeout: Duration,
        resolvers: Vec<Box<dyn UrlResolver>>,
    ) -> Result<Self, DownloadError> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self {
            client,
            sandbox,
            resolvers,
            byte_limit,
        })
    }

    /// Download `source_url` to `dest_rel` (relative to the storage root).
    ///
    /// Returns the final absolute path and the number of bytes written
    /// (the declared length can be absent or wrong, so callers should use
    /// the returned count). The body streams to a `<dest>.part` sibling
    /// and is only renamed into place on full success, so an existing
    /// destination is never partially overwritten. A failed transfer
    /// leaves the partial `.part` file behind for the caller to clean up
    /// or ignore. `on_progress(bytes_written, declared_total)` fires after
    /// every chunk.
    pub async fn download<F>(
        &self,
        source_url: &str,
        dest_rel: &str,
        mut on_progress: F,
    ) -> Result<(PathBuf, u64), DownloadError>
    where
        F: FnMut(u64, Option<u64>) + Send,
    {
        let original = Url::parse(source_url).map_err(|e| DownloadError::InvalidUrl {
            url: source_url.to_string(),
            reason: e.to_string(),
        })?;

        let dest = self.sandbox.resolve(dest_rel)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut effective = self.resolve_direct_url(&original).await;
        let confirm_resolver = self
            .resolvers
            .iter()
            .find(|resolver| resolver.matches(&original) && resolver.handles_confirm_pages());
        let mut hops = 0;

        loop {
            let response = self.client.get(&effective).send().await?;
            if !response.status().is_success() {
                return Err(DownloadError::Http {
                    status: response.status().as_u16(),
                    url: effective,
                });
            }

            // A confirm-capable host answering with HTML is serving the
            // "confirm large file" interstitial, not the content.
            if let Some(resolver) = confirm_resolver
                && is_html(&response)
            {
                if hops == MAX_CONFIRM_HOPS {
                    return Err(DownloadError::InvalidUrl {
                        url: effective,
                        reason: format!(
                            "still receiving confirm pages after {MAX_CONFIRM_HOPS} hops"
                        ),
                    });
                }
                let current = response.url().clone();
                let html = response.text().await?;
                let Some(next) = resolver.confirm_retry(&current, &html) else {
                    return Err(DownloadError::InvalidUrl {
                        url: current.to_string(),
                        reason: "host returned HTML instead of file content and no confirm \
                                 token was found"
                            .to_string(),
                    });
                };
                debug!("following confirm interstitial (hop {}): {next}", hops + 1);
                effective = next;
                hops += 1;
                continue;
            }

            return self.stream_to_file(response, &dest, &mut on_progress).await;
        }
    }

    /// Map a share link to a direct URL via the first matching resolver.
    /// A heuristic miss degrades to the original URL unmodified.
    async fn resolve_direct_url(&self, original: &Url) -> String {
        for resolver in &self.resolvers {
            if resolver.matches(original) {
                if let Some(direct) = resolver.resolve(original).await {
                    debug!("resolved {original} to direct URL {direct}");
                    return direct;
                }
                warn!("could not resolve a direct URL for {original}, using it as-is");
            }
        }
        original.to_string()
    }

    async fn stream_to_file<F>(
        &self,
        response: reqwest::Response,
        dest: &Path,
        on_progress: &mut F,
    ) -> Result<(PathBuf, u64), DownloadError>
    where
        F: FnMut(u64, Option<u64>) + Send,
    {
        let declared = response.content_length();
        if let Some(total) = declared
            && total > self.byte_limit
        {
            return Err(DownloadError::TooLarge {
                size: total,
                limit: self.byte_limit,
            });
        }

        let part = part_path(dest);
        let mut file = tokio::fs::File::create(&part).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            if written > self.byte_limit {
                // The partial .part file stays behind on purpose.
                return Err(DownloadError::TooLarge {
                    size: written,
                    limit: self.byte_limit,
                });
            }
            on_progress(written, declared);
        }

        file.flush().await?;
        drop(file);
        tokio::fs::rename(&part, dest).await?;
        Ok((dest.to_path_buf(), written))
    }
}

/// Sibling temp path: `<dest>.part`.
fn part_path(dest: &Path) -> PathBuf {
    let mut os = dest.as_os_str().to_owned();
    os.push(".part");
    PathBuf::from(os)
}

fn is_html(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("text/html"))
}

/// Guess a display filename from a URL: percent-decoded basename of the
/// path, sanitized, `"download"` when the path has none.
pub fn guess_filename(url: &str) -> String {
    let raw = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(|s| s.to_string()))
        })
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| "download".to_string());
    let decoded = urlencoding::decode(&raw)
        .map(|cow| cow.into_owned())
        .unwrap_or(raw);
    sanitize_name(&decoded, "download")
}
