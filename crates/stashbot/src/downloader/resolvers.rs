//! Host-specific URL resolution.
//!
//! Each resolver either produces a direct-download URL or has no opinion,
//! in which case the downloader falls through to the original URL. The
//! scraping heuristics are brittle by nature, so they degrade to "no
//! opinion" instead of failing the download.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::debug;
use url::Url;

/// A pluggable direct-URL resolver for one file host.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    /// Whether this resolver applies to the URL's host.
    fn matches(&self, url: &Url) -> bool;

    /// Return a direct-download URL, or `None` when the heuristic misses.
    async fn resolve(&self, url: &Url) -> Option<String>;

    /// Whether an HTML response from this host is a "confirm large file"
    /// interstitial rather than the content itself.
    fn handles_confirm_pages(&self) -> bool {
        false
    }

    /// Build the follow-up URL from an interstitial page, or `None` when
    /// the page carries no usable token.
    fn confirm_retry(&self, _current: &Url, _html: &str) -> Option<String> {
        None
    }
}

static DRIVE_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/file/d/([A-Za-z0-9_-]+)").expect("valid regex"));

static CONFIRM_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"confirm=([0-9A-Za-z_]+)").expect("valid regex"));

/// Google Drive share links: extract the file id from a `/file/d/<id>`
/// segment or an `id` query parameter and build the canonical
/// `uc?export=download` URL. Pure, no I/O.
pub struct GoogleDriveResolver;

impl GoogleDriveResolver {
    pub fn direct_url(id: &str) -> String {
        format!("https://drive.google.com/uc?export=download&id={id}")
    }

    pub fn confirm_url(id: &str, token: &str) -> String {
        format!("https://drive.google.com/uc?export=download&confirm={token}&id={id}")
    }

    fn file_id(url: &Url) -> Option<String> {
        if let Some(captures) = DRIVE_FILE_RE.captures(url.path()) {
            return Some(captures[1].to_string());
        }
        url.query_pairs()
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.into_owned())
    }
}

#[async_trait]
impl UrlResolver for GoogleDriveResolver {
    fn matches(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| host.to_ascii_lowercase().contains("drive.google.com"))
    }

    async fn resolve(&self, url: &Url) -> Option<String> {
        Self::file_id(url).map(|id| Self::direct_url(&id))
    }

    fn handles_confirm_pages(&self) -> bool {
        true
    }

    /// Needs both the `confirm=<token>` value in the HTML and the file id
    /// in the current URL.
    fn confirm_retry(&self, current: &Url, html: &str) -> Option<String> {
        let token = CONFIRM_TOKEN_RE.captures(html)?.get(1)?.as_str().to_string();
        let id = current
            .query_pairs()
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.into_owned())?;
        Some(Self::confirm_url(&id, &token))
    }
}

static BUTTON_ID_THEN_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a[^>]*\bid\s*=\s*["']downloadButton["'][^>]*\bhref\s*=\s*["']([^"']+)["']"#)
        .expect("valid regex")
});

static BUTTON_HREF_THEN_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a[^>]*\bhref\s*=\s*["']([^"']+)["'][^>]*\bid\s*=\s*["']downloadButton["']"#)
        .expect("valid regex")
});

static ANY_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a[^>]*\bhref\s*=\s*["']([^"']+)["']"#).expect("valid regex"));

/// Mediafire landing pages: fetch the HTML and scrape the primary download
/// anchor.
pub struct MediafireResolver {
    client: Client,
}

impl MediafireResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The `id="downloadButton"` anchor's href, else the first absolute
    /// href containing "download".
    pub fn extract_download_href(html: &str) -> Option<String> {
        if let Some(captures) = BUTTON_ID_THEN_HREF_RE.captures(html) {
            return Some(captures[1].to_string());
        }
        if let Some(captures) = BUTTON_HREF_THEN_ID_RE.captures(html) {
            return Some(captures[1].to_string());
        }
        ANY_HREF_RE
            .captures_iter(html)
            .map(|captures| captures[1].to_string())
            .find(|href| href.contains("download") && href.starts_with("http"))
    }
}

#[async_trait]
impl UrlResolver for MediafireResolver {
    fn matches(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| host.to_ascii_lowercase().contains("mediafire.com"))
    }

    async fn resolve(&self, url: &Url) -> Option<String> {
        let response = self.client.get(url.clone()).send().await.ok()?;
        if !response.status().is_success() {
            debug!("mediafire page fetch returned {}", response.status());
            return None;
        }
        let html = response.text().await.ok()?;
        Self::extract_download_href(&html)
    }
}
