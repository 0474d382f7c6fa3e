//! Downloader behaviour against a throwaway local HTTP server.

use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use regex::Regex;
use sandboxed_path::PathSandbox;
use stashbot::downloader::{Downloader, UrlResolver};
use stashbot::errors::DownloadError;
use url::Url;

const LIMIT: u64 = 4096;

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/small.bin", get(|| async { vec![0xABu8; 1024] }))
        .route("/big-declared.bin", get(|| async { vec![0u8; 8192] }))
        .route(
            "/big-stream.bin",
            get(|| async {
                let chunks = (0..8).map(|_| Ok::<_, Infallible>(vec![0u8; 1024]));
                Body::from_stream(futures_util::stream::iter(chunks))
            }),
        )
        .route(
            "/share/start",
            get(|| async { Html(r#"<html><a href="/share/file">confirm</a></html>"#) }),
        )
        .route("/share/file", get(|| async { vec![0xCDu8; 512] }))
        .route(
            "/loop/start",
            get(|| async { Html(r#"<html><a href="/loop/start">confirm</a></html>"#) }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A share host whose interstitial pages link to the next URL directly.
struct LoopbackShareResolver;

#[async_trait]
impl UrlResolver for LoopbackShareResolver {
    fn matches(&self, url: &Url) -> bool {
        url.host_str() == Some("127.0.0.1")
    }

    async fn resolve(&self, _url: &Url) -> Option<String> {
        None
    }

    fn handles_confirm_pages(&self) -> bool {
        true
    }

    fn confirm_retry(&self, current: &Url, html: &str) -> Option<String> {
        let href = Regex::new(r#"href="([^"]+)""#).unwrap().captures(html)?[1].to_string();
        current.join(&href).ok().map(|url| url.to_string())
    }
}

async fn confirm_fixture() -> (tempfile::TempDir, PathSandbox, Downloader) {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = PathSandbox::new(dir.path()).await.unwrap();
    let downloader = Downloader::with_resolvers(
        sandbox.clone(),
        LIMIT,
        Duration::from_secs(5),
        vec![Box::new(LoopbackShareResolver)],
    )
    .unwrap();
    (dir, sandbox, downloader)
}

async fn fixture() -> (tempfile::TempDir, PathSandbox, Downloader) {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = PathSandbox::new(dir.path()).await.unwrap();
    let downloader =
        Downloader::new(sandbox.clone(), LIMIT, Duration::from_secs(5)).unwrap();
    (dir, sandbox, downloader)
}

#[tokio::test]
async fn small_file_lands_at_the_destination() {
    let base = spawn_server().await;
    let (_dir, sandbox, downloader) = fixture().await;

    let mut progress_calls = 0u32;
    let (path, written) = downloader
        .download(&format!("{base}/small.bin"), "sub/small.bin", |_, _| {
            progress_calls += 1;
        })
        .await
        .unwrap();

    assert_eq!(written, 1024);
    assert_eq!(path, sandbox.resolve("sub/small.bin").unwrap());
    assert_eq!(std::fs::read(&path).unwrap(), vec![0xABu8; 1024]);
    assert!(progress_calls > 0);
    assert!(!sandbox.resolve("sub/small.bin.part").unwrap().exists());
}

#[tokio::test]
async fn declared_oversize_fails_before_any_write() {
    let base = spawn_server().await;
    let (_dir, sandbox, downloader) = fixture().await;

    let err = downloader
        .download(&format!("{base}/big-declared.bin"), "big.bin", |_, _| {})
        .await
        .unwrap_err();

    match err {
        DownloadError::TooLarge { size, limit } => {
            assert_eq!(size, 8192);
            assert_eq!(limit, LIMIT);
        }
        other => panic!("expected TooLarge, got {other:?}"),
    }
    assert!(!sandbox.resolve("big.bin").unwrap().exists());
    assert!(!sandbox.resolve("big.bin.part").unwrap().exists());
}

#[tokio::test]
async fn midstream_oversize_leaves_only_the_part_file() {
    let base = spawn_server().await;
    let (_dir, sandbox, downloader) = fixture().await;

    let err = downloader
        .download(&format!("{base}/big-stream.bin"), "stream.bin", |_, _| {})
        .await
        .unwrap_err();

    match err {
        DownloadError::TooLarge { size, limit } => {
            assert!(size > limit);
        }
        other => panic!("expected TooLarge, got {other:?}"),
    }
    assert!(!sandbox.resolve("stream.bin").unwrap().exists());
    let part = sandbox.resolve("stream.bin.part").unwrap();
    assert!(std::fs::metadata(&part).unwrap().len() > LIMIT);
}

#[tokio::test]
async fn missing_resource_surfaces_the_status() {
    let base = spawn_server().await;
    let (_dir, _sandbox, downloader) = fixture().await;

    let err = downloader
        .download(&format!("{base}/nope.bin"), "nope.bin", |_, _| {})
        .await
        .unwrap_err();

    match err {
        DownloadError::Http { status, .. } => assert_eq!(status, 404),
        other => panic!("expected Http, got {other:?}"),
    }
}

#[tokio::test]
async fn confirm_interstitial_is_followed_to_the_content() {
    let base = spawn_server().await;
    let (_dir, sandbox, downloader) = confirm_fixture().await;

    let (path, written) = downloader
        .download(&format!("{base}/share/start"), "shared.bin", |_, _| {})
        .await
        .unwrap();

    assert_eq!(written, 512);
    assert_eq!(std::fs::read(&path).unwrap(), vec![0xCDu8; 512]);
    assert!(!sandbox.resolve("shared.bin.part").unwrap().exists());
}

#[tokio::test]
async fn endless_confirm_pages_fail_after_the_hop_cap() {
    let base = spawn_server().await;
    let (_dir, sandbox, downloader) = confirm_fixture().await;

    let err = downloader
        .download(&format!("{base}/loop/start"), "looped.bin", |_, _| {})
        .await
        .unwrap_err();

    match err {
        DownloadError::InvalidUrl { reason, .. } => {
            assert!(reason.contains("after 3 hops"), "{reason}");
        }
        other => panic!("expected InvalidUrl, got {other:?}"),
    }
    assert!(!sandbox.resolve("looped.bin").unwrap().exists());
    assert!(!sandbox.resolve("looped.bin.part").unwrap().exists());
}

#[tokio::test]
async fn escaping_destinations_are_rejected() {
    let (_dir, _sandbox, downloader) = fixture().await;

    let err = downloader
        .download("https://example.com/a.bin", "../outside.bin", |_, _| {})
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Sandbox(_)), "{err:?}");
}
