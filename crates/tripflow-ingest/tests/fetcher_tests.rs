//! Source fetch behaviour against a mock HTTP endpoint.

mod common;

use common::*;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tripflow_ingest::error::IngestError;
use tripflow_ingest::fetcher::UnitFetcher;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_fetch_streams_payload_to_transient_file() {
    let server = MockServer::start().await;
    let body = payload(64 * 1024);
    Mock::given(method("GET"))
        .and(path(source_path("2024-01")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let work_dir = TempDir::new().unwrap();
    let fetcher = UnitFetcher::new(source_config(&server.uri(), work_dir.path())).unwrap();

    let result = fetcher.fetch(unit("2024-01")).await;

    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(result.byte_size, body.len() as u64);
    assert_eq!(result.sha256, hex::encode(Sha256::digest(&body)));
    assert_eq!(result.file_name(), "yellow_tripdata_2024-01.parquet");

    let local = result.local_path.clone().unwrap();
    assert!(local.starts_with(work_dir.path()));
    assert!(local.to_string_lossy().ends_with(".part"));
    assert_eq!(std::fs::read(&local).unwrap(), body);
    assert_eq!(files_in(work_dir.path()).len(), 1);
}

#[tokio::test]
async fn test_each_fetch_gets_its_own_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(source_path("2024-05")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload(128)))
        .mount(&server)
        .await;

    let work_dir = TempDir::new().unwrap();
    let fetcher = UnitFetcher::new(source_config(&server.uri(), work_dir.path())).unwrap();

    let first = fetcher.fetch(unit("2024-05")).await;
    let second = fetcher.fetch(unit("2024-05")).await;

    assert_ne!(first.local_path, second.local_path);
    assert_eq!(files_in(work_dir.path()).len(), 2);
}

#[tokio::test]
async fn test_non_success_status_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(source_path("2024-02")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let work_dir = TempDir::new().unwrap();
    let fetcher = UnitFetcher::new(source_config(&server.uri(), work_dir.path())).unwrap();

    let result = fetcher.fetch(unit("2024-02")).await;

    assert!(!result.is_success());
    assert!(result.local_path.is_none());
    assert!(matches!(result.error, Some(IngestError::Transport { .. })));
    assert!(files_in(work_dir.path()).is_empty());
}

#[tokio::test]
async fn test_timeout_is_transport_error_and_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(source_path("2024-03")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(payload(256))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let work_dir = TempDir::new().unwrap();
    let mut config = source_config(&server.uri(), work_dir.path());
    config.fetch_timeout_secs = 1;
    let fetcher = UnitFetcher::new(config).unwrap();

    let result = fetcher.fetch(unit("2024-03")).await;

    match result.error {
        Some(IngestError::Transport { reason, .. }) => assert!(reason.contains("timed out"), "{}", reason),
        other => panic!("expected transport error, got {:?}", other),
    }
    assert!(files_in(work_dir.path()).is_empty());
}

#[tokio::test]
async fn test_unreachable_source_is_transport_error() {
    let work_dir = TempDir::new().unwrap();
    // Nothing listens on port 9 (discard) in the test environment
    let fetcher = UnitFetcher::new(source_config("http://127.0.0.1:9", work_dir.path())).unwrap();

    let result = fetcher.fetch(unit("2024-04")).await;

    assert!(matches!(result.error, Some(IngestError::Transport { .. })));
    assert!(files_in(work_dir.path()).is_empty());
}

#[tokio::test]
async fn test_creates_missing_work_dir() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload(32)))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let work_dir = root.path().join("nested").join("tmp");
    let fetcher = UnitFetcher::new(source_config(&server.uri(), &work_dir)).unwrap();

    let result = fetcher.fetch(unit("2025-01")).await;

    assert!(result.is_success());
    assert_eq!(files_in(&work_dir).len(), 1);
}

/// Serve one response that declares `declared` bytes but sends only `sent`
async fn short_body_server(declared: usize, sent: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\n\r\n",
            declared
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&payload(sent)).await.unwrap();
        socket.flush().await.unwrap();
        // Dropping the socket ends the body early
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_truncated_body_is_transport_error_and_leaves_no_file() {
    let uri = short_body_server(100_000, 5_000).await;
    let work_dir = TempDir::new().unwrap();
    let fetcher = UnitFetcher::new(source_config(&uri, work_dir.path())).unwrap();

    let result = fetcher.fetch(unit("2024-06")).await;

    assert!(!result.is_success());
    assert!(result.local_path.is_none());
    match &result.error {
        Some(IngestError::Transport { locator, .. }) => {
            assert!(locator.ends_with("yellow_tripdata_2024-06.parquet"), "{}", locator)
        },
        other => panic!("expected transport error, got {:?}", other),
    }
    assert!(files_in(work_dir.path()).is_empty());
}
