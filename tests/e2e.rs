//! End-to-end tests for the download queue
//!
//! Each test starts a local axum origin on an ephemeral port, points a
//! `DownloadManager` at a temporary output directory and checks the final
//! task snapshots plus the files on disk.

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{Duration, sleep, timeout};

use fetchq::config::Config;
use fetchq::humanize::ByteSize;
use fetchq::queue::EnqueueError;
use fetchq::{DownloadManager, TaskStatus};

const FILE_SIZE: usize = 64 * 1024;
const TOKEN: &str = "s3cret";

/// Tracks how many file requests the origin is serving at once
#[derive(Clone, Default)]
struct Origin {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn serve_file(State(origin): State<Origin>, Path(_name): Path<String>) -> impl IntoResponse {
    let now = origin.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    origin.peak.fetch_max(now, Ordering::SeqCst);

    sleep(Duration::from_millis(100)).await;

    origin.in_flight.fetch_sub(1, Ordering::SeqCst);
    payload(FILE_SIZE)
}

async fn serve_chunked() -> impl IntoResponse {
    let chunks = (0..4).map(|_| Ok::<_, std::io::Error>(Bytes::from(payload(1000))));
    Body::from_stream(futures_util::stream::iter(chunks))
}

async fn serve_private(headers: HeaderMap) -> impl IntoResponse {
    let expected = format!("Bearer {TOKEN}");
    match headers.get(header::AUTHORIZATION) {
        Some(value) if value.as_bytes() == expected.as_bytes() => {
            (StatusCode::OK, payload(512)).into_response()
        }
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn serve_empty() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

async fn spawn_origin() -> (SocketAddr, Origin) {
    let origin = Origin::default();
    let app = Router::new()
        .route("/files/{name}", get(serve_file))
        .route("/stream/data.bin", get(serve_chunked))
        .route("/private/report.pdf", get(serve_private))
        .route("/empty", get(serve_empty))
        .with_state(origin.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, origin)
}

/// One-shot origin that declares 10000 bytes, sends 5000 and hangs up
async fn spawn_truncating_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }

        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10000\r\n\r\n")
            .await
            .unwrap();
        socket.write_all(&payload(5000)).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    addr
}

fn test_config(dir: &TempDir, workers: usize) -> Config {
    let mut config = Config::default();
    config.downloads.workers = workers;
    config.downloads.output_dir = dir.path().to_path_buf();
    config.downloads.chunk_size = ByteSize(4 * 1024);
    config.http.connect_timeout_secs = 5;
    config.http.read_timeout_secs = 5;
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_caps_concurrency_and_finishes_every_task() {
    let (addr, origin) = spawn_origin().await;
    let dir = TempDir::new().unwrap();
    let manager = DownloadManager::start(&test_config(&dir, 2)).await.unwrap();
    let dispatcher = manager.dispatcher();

    let stop = Arc::new(AtomicBool::new(false));
    let sampler = {
        let dispatcher = dispatcher.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            let mut most = 0;
            while !stop.load(Ordering::SeqCst) {
                most = most.max(dispatcher.active_downloads());
                sleep(Duration::from_millis(5)).await;
            }
            most
        })
    };

    let ids: Vec<_> = (0..5)
        .map(|i| {
            dispatcher
                .enqueue(format!("http://{addr}/files/part{i}.bin"))
                .unwrap()
        })
        .collect();

    let tasks = timeout(Duration::from_secs(30), manager.shutdown())
        .await
        .expect("downloads did not finish in time");
    stop.store(true, Ordering::SeqCst);
    let most_downloading = sampler.await.unwrap();

    assert!(most_downloading <= 2, "saw {most_downloading} downloading");
    assert_eq!(origin.peak.load(Ordering::SeqCst), 2);
    assert_eq!(tasks.len(), 5);
    assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), ids);

    for task in &tasks {
        assert_eq!(task.status, TaskStatus::Completed, "{task:?}");
        assert_eq!(task.file_size, Some(FILE_SIZE as u64));
        assert_eq!(task.downloaded_bytes, FILE_SIZE as u64);
        assert_eq!(task.progress, Some(1.0));
        assert!(task.completed_at.is_some());

        let written = std::fs::read(dir.path().join(task.filename.as_ref().unwrap())).unwrap();
        assert_eq!(written, payload(FILE_SIZE));
    }

    let metrics = dispatcher.metrics().snapshot();
    assert_eq!(metrics.tasks_completed, 5);
    assert_eq!(metrics.bytes_downloaded, 5 * FILE_SIZE as u64);
}

#[tokio::test]
async fn test_same_name_downloads_get_numbered_files() {
    let (addr, _origin) = spawn_origin().await;
    let dir = TempDir::new().unwrap();
    let manager = DownloadManager::start(&test_config(&dir, 3)).await.unwrap();
    let dispatcher = manager.dispatcher();

    for _ in 0..3 {
        dispatcher
            .enqueue(format!("http://{addr}/files/report.pdf"))
            .unwrap();
    }
    let tasks = manager.shutdown().await;

    let mut names: Vec<_> = tasks
        .iter()
        .map(|t| t.filename.clone().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["report (1).pdf", "report (2).pdf", "report.pdf"]);
}

#[tokio::test]
async fn test_http_error_fails_task() {
    let (addr, _origin) = spawn_origin().await;
    let dir = TempDir::new().unwrap();
    let manager = DownloadManager::start(&test_config(&dir, 1)).await.unwrap();
    let dispatcher = manager.dispatcher();

    let id = dispatcher
        .enqueue(format!("http://{addr}/nope/missing.zip"))
        .unwrap();
    let tasks = manager.shutdown().await;

    let task = tasks.iter().find(|t| t.id == id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error_message.as_deref().unwrap().contains("404"));
    assert_eq!(task.downloaded_bytes, 0);
    assert_eq!(dispatcher.metrics().snapshot().tasks_failed, 1);
}

#[tokio::test]
async fn test_truncated_body_fails_and_keeps_partial_file() {
    let addr = spawn_truncating_origin().await;
    let dir = TempDir::new().unwrap();
    let manager = DownloadManager::start(&test_config(&dir, 1)).await.unwrap();

    manager
        .dispatcher()
        .enqueue(format!("http://{addr}/partial.bin"))
        .unwrap();
    let tasks = manager.shutdown().await;

    let task = &tasks[0];
    assert_eq!(task.status, TaskStatus::Failed, "{task:?}");
    assert!(!task.error_message.as_deref().unwrap().is_empty());
    assert_eq!(task.file_size, Some(10_000));
    assert_eq!(task.downloaded_bytes, 5000);

    let kept = std::fs::read(dir.path().join("partial.bin")).unwrap();
    assert_eq!(kept, payload(5000));
}

#[tokio::test]
async fn test_no_content_response_fails_task() {
    let (addr, _origin) = spawn_origin().await;
    let dir = TempDir::new().unwrap();
    let manager = DownloadManager::start(&test_config(&dir, 1)).await.unwrap();

    manager
        .dispatcher()
        .enqueue(format!("http://{addr}/empty"))
        .unwrap();
    let tasks = manager.shutdown().await;

    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert!(tasks[0].error_message.is_some());
}

#[tokio::test]
async fn test_malformed_and_unreachable_urls_fail() {
    let dir = TempDir::new().unwrap();
    let manager = DownloadManager::start(&test_config(&dir, 2)).await.unwrap();
    let dispatcher = manager.dispatcher();

    dispatcher.enqueue("definitely not a url").unwrap();
    // Port 9 (discard) on loopback is almost never listening
    dispatcher.enqueue("http://127.0.0.1:9/file.bin").unwrap();
    let tasks = manager.shutdown().await;

    for task in &tasks {
        assert_eq!(task.status, TaskStatus::Failed, "{task:?}");
        assert!(!task.error_message.as_deref().unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_unknown_length_body_completes() {
    let (addr, _origin) = spawn_origin().await;
    let dir = TempDir::new().unwrap();
    let manager = DownloadManager::start(&test_config(&dir, 1)).await.unwrap();

    manager
        .dispatcher()
        .enqueue(format!("http://{addr}/stream/data.bin"))
        .unwrap();
    let tasks = manager.shutdown().await;

    let task = &tasks[0];
    assert_eq!(task.status, TaskStatus::Completed, "{task:?}");
    assert_eq!(task.downloaded_bytes, 4000);
    assert_eq!(task.file_size, Some(4000));
    assert_eq!(task.filename.as_deref(), Some("data.bin"));
    assert_eq!(
        std::fs::read(dir.path().join("data.bin")).unwrap().len(),
        4000
    );
}

#[tokio::test]
async fn test_org_token_sent_as_bearer() {
    let (addr, _origin) = spawn_origin().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, 1);
    config
        .auth
        .tokens
        .insert("acme".to_string(), TOKEN.to_string());
    let manager = DownloadManager::start(&config).await.unwrap();
    let dispatcher = manager.dispatcher();

    let url = format!("http://{addr}/private/report.pdf");
    let authed = dispatcher
        .enqueue_for(url.as_str(), Some("acme".to_string()))
        .unwrap();
    let anonymous = dispatcher.enqueue(url.as_str()).unwrap();
    let unknown_org = dispatcher
        .enqueue_for(url.as_str(), Some("globex".to_string()))
        .unwrap();
    let tasks = manager.shutdown().await;

    let status = |id| tasks.iter().find(|t| t.id == id).unwrap();

    assert_eq!(status(authed).status, TaskStatus::Completed);
    assert_eq!(status(authed).downloaded_bytes, 512);

    assert_eq!(status(anonymous).status, TaskStatus::Failed);
    assert!(
        status(anonymous)
            .error_message
            .as_deref()
            .unwrap()
            .contains("401")
    );

    assert_eq!(status(unknown_org).status, TaskStatus::Failed);
    assert!(
        status(unknown_org)
            .error_message
            .as_deref()
            .unwrap()
            .contains("globex")
    );
}

#[tokio::test]
async fn test_progress_events_are_monotonic() {
    let (addr, _origin) = spawn_origin().await;
    let dir = TempDir::new().unwrap();
    let manager = DownloadManager::start(&test_config(&dir, 1)).await.unwrap();
    let dispatcher = manager.dispatcher();
    let mut events = dispatcher.subscribe_progress();

    let id = dispatcher
        .enqueue(format!("http://{addr}/files/big.bin"))
        .unwrap();
    let task = dispatcher.handle(id).unwrap().wait_terminal().await;
    assert_eq!(task.status, TaskStatus::Completed);

    let mut last = 0;
    let mut seen = 0;
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.task_id, id);
        assert_eq!(event.file_size, Some(FILE_SIZE as u64));
        assert!(event.downloaded_bytes > last);
        assert!(event.downloaded_bytes - last <= 4 * 1024);
        last = event.downloaded_bytes;
        seen += 1;
    }
    assert_eq!(last, FILE_SIZE as u64);
    assert!(seen >= FILE_SIZE / (4 * 1024));

    manager.shutdown().await;
}

#[tokio::test]
async fn test_terminal_snapshot_is_stable() {
    let (addr, _origin) = spawn_origin().await;
    let dir = TempDir::new().unwrap();
    let manager = DownloadManager::start(&test_config(&dir, 1)).await.unwrap();
    let dispatcher = manager.dispatcher();

    let id = dispatcher
        .enqueue(format!("http://{addr}/files/stable.bin"))
        .unwrap();
    let first = dispatcher.handle(id).unwrap().wait_terminal().await;
    sleep(Duration::from_millis(50)).await;
    let second = dispatcher.status(id).unwrap();

    assert_eq!(first, second);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_enqueue_after_shutdown_is_rejected() {
    let dir = TempDir::new().unwrap();
    let manager = DownloadManager::start(&test_config(&dir, 1)).await.unwrap();
    let dispatcher = manager.dispatcher();

    manager.shutdown().await;

    assert_eq!(
        dispatcher.enqueue("http://127.0.0.1:9/late.bin"),
        Err(EnqueueError::Closed)
    );
    assert!(dispatcher.tasks().is_empty());
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, 0);
    config.downloads.workers = 0;

    assert!(DownloadManager::start(&config).await.is_err());
}
