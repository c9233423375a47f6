//! Direct HTTP downloads against a local server, with no transcoder installed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, Bytes},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use fetchmux::config::TranscodeConfig;
use fetchmux::transcode::fallback::{FetchOutcome, HttpFallback};
use fetchmux::transcode::{StartRequest, Task, TaskStatus, TaskStore, TranscodeSupervisor};
use fetchmux::utils::http_client::install_rustls_provider;
use fetchmux::Error;
use futures::StreamExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const CLIP_LEN: usize = 256 * 1024;

fn clip_bytes() -> Vec<u8> {
    (0..CLIP_LEN).map(|i| (i % 251) as u8).collect()
}

async fn clip() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "video/mp4")], clip_bytes())
}

async fn page() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        "<html><title>not a video</title></html>",
    )
}

async fn gone() -> impl IntoResponse {
    (StatusCode::GONE, [(header::CONTENT_TYPE, "video/mp4")], "")
}

/// One chunk, then nothing until the client gives up.
async fn live() -> impl IntoResponse {
    let first = futures::stream::once(async { Ok::<_, std::io::Error>(Bytes::from_static(b"head")) });
    let body = Body::from_stream(first.chain(futures::stream::pending()));
    ([(header::CONTENT_TYPE, "video/mp4")], body)
}

/// One chunk, then the connection breaks.
async fn broken() -> impl IntoResponse {
    let chunks = futures::stream::iter([
        Ok(Bytes::from_static(b"head")),
        Err(std::io::Error::other("upstream reset")),
    ]);
    ([(header::CONTENT_TYPE, "video/mp4")], Body::from_stream(chunks))
}

async fn serve() -> SocketAddr {
    let app = Router::new()
        .route("/clip.mp4", get(clip))
        .route("/page", get(page))
        .route("/gone.mp4", get(gone))
        .route("/live.mp4", get(live))
        .route("/broken.mp4", get(broken));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    addr
}

fn client() -> reqwest::Client {
    install_rustls_provider();
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn supervisor(downloads: &TempDir) -> Arc<TranscodeSupervisor> {
    Arc::new(TranscodeSupervisor::new(
        TranscodeConfig::new(downloads.path()),
        Arc::new(TaskStore::new()),
        None,
        client(),
    ))
}

async fn wait_until<F>(supervisor: &TranscodeSupervisor, id: &str, mut done: F) -> Task
where
    F: FnMut(&Task) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        let task = supervisor.store().get(id).expect("task registered");
        if done(&task) {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting on task {id}: {:?} {}",
            task.status,
            task.message
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn fetch_writes_body_and_reports_progress() {
    let addr = serve().await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("clip_tmp.mp4");
    let fallback = HttpFallback::new(client());

    let mut seen = Vec::new();
    let outcome = fallback
        .fetch(
            &format!("http://{addr}/clip.mp4"),
            &dest,
            &CancellationToken::new(),
            |percent| seen.push(percent),
        )
        .await
        .unwrap();

    assert_eq!(outcome, FetchOutcome::Completed);
    assert_eq!(std::fs::read(&dest).unwrap(), clip_bytes());
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
}

#[tokio::test]
async fn fetch_rejects_non_video_content() {
    let addr = serve().await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("page_tmp.mp4");

    let result = HttpFallback::new(client())
        .fetch(
            &format!("http://{addr}/page"),
            &dest,
            &CancellationToken::new(),
            |_| {},
        )
        .await;

    assert!(matches!(result, Err(Error::Other(ref m)) if m.contains("text/html")));
    assert!(!dest.exists());
}

#[tokio::test]
async fn fetch_fails_on_error_status() {
    let addr = serve().await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("gone_tmp.mp4");

    let result = HttpFallback::new(client())
        .fetch(
            &format!("http://{addr}/gone.mp4"),
            &dest,
            &CancellationToken::new(),
            |_| {},
        )
        .await;

    match result {
        Err(Error::Http(e)) => assert_eq!(e.status(), Some(reqwest::StatusCode::GONE)),
        other => panic!("expected an HTTP error, got {other:?}"),
    }
    assert!(!dest.exists());
}

#[tokio::test]
async fn broken_stream_removes_partial_file() {
    let addr = serve().await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("broken_tmp.mp4");

    let result = HttpFallback::new(client())
        .fetch(
            &format!("http://{addr}/broken.mp4"),
            &dest,
            &CancellationToken::new(),
            |_| {},
        )
        .await;

    assert!(result.is_err());
    assert!(!dest.exists());
}

#[tokio::test]
async fn fetch_stops_when_cancelled() {
    let addr = serve().await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("live_tmp.mp4");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        HttpFallback::new(client()).fetch(
            &format!("http://{addr}/live.mp4"),
            &dest,
            &cancel,
            |_| {},
        ),
    )
    .await
    .expect("fetch returned after cancel")
    .unwrap();

    assert_eq!(outcome, FetchOutcome::Cancelled);
}

#[tokio::test]
async fn task_completes_without_transcoder() {
    let addr = serve().await;
    let downloads = TempDir::new().unwrap();
    let supervisor = supervisor(&downloads);

    let id = supervisor
        .start(StartRequest::new(format!("http://{addr}/clip.mp4")).with_name("clip"))
        .unwrap();
    let task = wait_until(&supervisor, &id, |t| t.status.is_terminal()).await;

    assert_eq!(task.status, TaskStatus::Done, "{}", task.message);
    assert_eq!(task.progress, 100);
    assert_eq!(task.out_file, downloads.path().join("clip.mp4"));
    assert_eq!(std::fs::read(&task.out_file).unwrap(), clip_bytes());
    assert!(!task.temp_file.exists());
}

#[tokio::test]
async fn other_container_needs_a_transcoder() {
    let addr = serve().await;
    let downloads = TempDir::new().unwrap();
    let supervisor = supervisor(&downloads);

    let id = supervisor
        .start(
            StartRequest::new(format!("http://{addr}/clip.mp4"))
                .with_name("clip")
                .with_format("mkv"),
        )
        .unwrap();
    let task = wait_until(&supervisor, &id, |t| t.status.is_terminal()).await;

    assert_eq!(task.status, TaskStatus::Error);
    assert!(task.message.contains("no transcoder"), "{}", task.message);
    assert!(!task.out_file.exists());
}

#[tokio::test]
async fn non_video_page_fails_the_task() {
    let addr = serve().await;
    let downloads = TempDir::new().unwrap();
    let supervisor = supervisor(&downloads);

    let id = supervisor
        .start(StartRequest::new(format!("http://{addr}/page")))
        .unwrap();
    let task = wait_until(&supervisor, &id, |t| t.status.is_terminal()).await;

    assert_eq!(task.status, TaskStatus::Error);
    assert!(task.message.contains("not a direct video"), "{}", task.message);
    assert!(!task.message.contains(&*downloads.path().to_string_lossy()));
}

#[tokio::test]
async fn cancelled_download_discards_temp_file() {
    let addr = serve().await;
    let downloads = TempDir::new().unwrap();
    let supervisor = supervisor(&downloads);

    let id = supervisor
        .start(StartRequest::new(format!("http://{addr}/live.mp4")).with_name("live"))
        .unwrap();
    let running = wait_until(&supervisor, &id, |t| {
        t.status == TaskStatus::Running && t.temp_file.exists()
    })
    .await;

    supervisor.cancel(&id).unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    while running.temp_file.exists() {
        assert!(tokio::time::Instant::now() < deadline, "temp file was kept");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let task = supervisor.store().get(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(!task.out_file.exists());
}
