//! Router tests against in-process fakes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use shortsmith_api::{create_router, ApiConfig, AppState};
use shortsmith_media::{ComposeConfig, DownloadConfig};
use shortsmith_pipeline::dev::{CopyComposer, DemoRowSource, PlaceholderDownloader};
use shortsmith_pipeline::{Pipeline, PipelineConfig, VideoUploader};
use shortsmith_sheets::SheetsConfig;
use shortsmith_youtube::{UploadRequest, UploadedVideo, YoutubeConfig, YoutubeResult};

const BOUNDARY: &str = "shortsmith-test-boundary";

struct TestApp {
    router: Router,
    _dir: TempDir,
}

fn configs(dir: &TempDir) -> (ApiConfig, PipelineConfig) {
    let api = ApiConfig {
        templates_path: dir.path().join("templates.json"),
        ..ApiConfig::default()
    };
    let pipeline = PipelineConfig {
        work_dir: dir.path().join("work"),
        dev_mode: true,
        dry_run: true,
        ..PipelineConfig::default()
    };
    (api, pipeline)
}

async fn dev_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let (api, pipeline_config) = configs(&dir);
    let pipeline = Pipeline::build(
        pipeline_config,
        SheetsConfig::default(),
        YoutubeConfig::default(),
        DownloadConfig::default(),
        ComposeConfig::default(),
    )
    .unwrap();

    let state = AppState::new(api, pipeline).await;
    TestApp {
        router: create_router(state, None),
        _dir: dir,
    }
}

/// Uploads block until the test hands out permits.
struct GatedUploader {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl VideoUploader for GatedUploader {
    async fn upload(&self, _request: &UploadRequest) -> YoutubeResult<UploadedVideo> {
        let permit = self.gate.acquire().await.unwrap();
        permit.forget();
        Ok(UploadedVideo {
            id: "gated".to_string(),
        })
    }
}

/// Stands in for a bug deep inside a run.
struct PanickingUploader;

#[async_trait]
impl VideoUploader for PanickingUploader {
    async fn upload(&self, _request: &UploadRequest) -> YoutubeResult<UploadedVideo> {
        panic!("uploader exploded");
    }
}

async fn app_with_uploader(uploader: Arc<dyn VideoUploader>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let (api, pipeline_config) = configs(&dir);
    let pipeline = Pipeline::new(
        pipeline_config,
        Arc::new(DemoRowSource::new("youtube_url")),
        Arc::new(PlaceholderDownloader),
        Arc::new(CopyComposer),
        uploader,
    );

    let state = AppState::new(api, pipeline).await;
    TestApp {
        router: create_router(state, None),
        _dir: dir,
    }
}

fn multipart_body(fields: &[(&str, &str)], clip: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(bytes) = clip {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"clip\"; filename=\"outro.mp4\"\r\nContent-Type: video/mp4\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn run_request(fields: &[(&str, &str)], clip: Option<&[u8]>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/runs")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(fields, clip)))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn wait_for_terminal(router: &Router, run_id: &str) -> Value {
    for _ in 0..200 {
        let (status, report) = send(router, get(&format!("/api/runs/{run_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        if report["state"] == "done" || report["state"] == "error" {
            return report;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("run {run_id} did not finish");
}

#[tokio::test]
async fn test_health() {
    let app = dev_app().await;
    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_ready_skips_tools_on_dry_run() {
    let app = dev_app().await;
    let (status, body) = send(&app.router, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["ffmpeg"]["status"], "skipped");
}

#[tokio::test]
async fn test_index_serves_form() {
    let app = dev_app().await;
    let response = app.router.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("id=\"run-form\""));
}

#[tokio::test]
async fn test_unknown_run_is_404() {
    let app = dev_app().await;
    let (status, body) = send(&app.router, get("/api/runs/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("does-not-exist"));

    let stop = Request::builder()
        .method("POST")
        .uri("/api/runs/does-not-exist/stop")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, stop).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_template_crud() {
    let app = dev_app().await;

    let put = Request::builder()
        .method("PUT")
        .uri("/api/templates/daily")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"title": "Day #{number}: {topic}", "description": "{originalUrl}"}).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app.router, put).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "daily");

    let (_, body) = send(&app.router, get("/api/templates")).await;
    assert_eq!(body["templates"].as_array().unwrap().len(), 1);
    assert_eq!(body["templates"][0]["title"], "Day #{number}: {topic}");

    let bad = Request::builder()
        .method("PUT")
        .uri("/api/templates/broken")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"title": "Day {number", "description": ""}).to_string()))
        .unwrap();
    let (status, _) = send(&app.router, bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let delete = Request::builder()
        .method("DELETE")
        .uri("/api/templates/daily")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&app.router, get("/api/templates")).await;
    assert!(body["templates"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_run_requires_clip() {
    let app = dev_app().await;
    let (status, body) = send(
        &app.router,
        run_request(&[("source", "https://docs.google.com/spreadsheets/d/abc")], None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("clip"));
}

#[tokio::test]
async fn test_scheduled_run_needs_start() {
    let app = dev_app().await;
    let (status, _) = send(
        &app.router,
        run_request(
            &[
                ("source", "https://docs.google.com/spreadsheets/d/abc"),
                ("privacy", "scheduled"),
            ],
            Some(b"clip"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dev_run_completes() {
    let app = dev_app().await;
    let (status, body) = send(
        &app.router,
        run_request(
            &[
                ("source", "https://docs.google.com/spreadsheets/d/abc"),
                ("title_template", "{topic} #{number}"),
                ("starting_number", "10"),
                ("privacy", "unlisted"),
            ],
            Some(b"fake clip bytes"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let report = wait_for_terminal(&app.router, &run_id).await;
    assert_eq!(report["state"], "done");
    assert_eq!(report["total_rows"], 3);

    let rows = report["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r["outcome"]["status"] == "uploaded"));
    assert_eq!(rows[0]["title"], "Classic #10");
    assert_eq!(rows[2]["title"], "Summer #12");

    let (_, list) = send(&app.router, get("/api/runs")).await;
    assert_eq!(list["runs"][0]["run_id"], run_id.as_str());
}

#[tokio::test]
async fn test_unknown_placeholder_fails_run() {
    let app = dev_app().await;
    let (status, body) = send(
        &app.router,
        run_request(
            &[
                ("source", "https://docs.google.com/spreadsheets/d/abc"),
                ("title_template", "{missing_column}"),
            ],
            Some(b"clip"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let report = wait_for_terminal(&app.router, &run_id).await;
    assert_eq!(report["state"], "error");
    assert!(report["rows"].as_array().unwrap().is_empty());
    assert!(report["error"].as_str().unwrap().contains("missing_column"));
}

#[tokio::test]
async fn test_second_run_conflicts_and_stop_skips_rest() {
    let gate = Arc::new(Semaphore::new(0));
    let app = app_with_uploader(Arc::new(GatedUploader {
        gate: Arc::clone(&gate),
    }))
    .await;
    let fields = [("source", "https://docs.google.com/spreadsheets/d/abc")];

    let (status, body) = send(&app.router, run_request(&fields, Some(b"clip"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let (status, _) = send(&app.router, run_request(&fields, Some(b"clip"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let stop = Request::builder()
        .method("POST")
        .uri(format!("/api/runs/{run_id}/stop"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, stop).await;
    assert_eq!(status, StatusCode::OK);

    // Let the in-flight upload finish; the stop lands before row 2
    gate.add_permits(10);

    let report = wait_for_terminal(&app.router, &run_id).await;
    assert_eq!(report["state"], "done");
    let rows = report["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    let skipped = rows
        .iter()
        .filter(|r| r["outcome"]["status"] == "skipped" && r["outcome"]["reason"] == "stopped")
        .count();
    assert!(skipped >= 2, "expected stopped rows, got {rows:?}");

    let (status, _) = send(&app.router, run_request(&fields, Some(b"clip"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_huge_schedule_interval_is_rejected() {
    let app = dev_app().await;
    let (status, body) = send(
        &app.router,
        run_request(
            &[
                ("source", "https://docs.google.com/spreadsheets/d/abc"),
                ("privacy", "scheduled"),
                ("schedule_start", "2099-01-01T10:00:00+00:00"),
                ("interval_hours", "4294967295"),
            ],
            Some(b"clip"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("publish"));

    // Nothing was registered, so a normal run still starts
    let (status, _) = send(
        &app.router,
        run_request(
            &[("source", "https://docs.google.com/spreadsheets/d/abc")],
            Some(b"clip"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_panicked_run_ends_in_error_and_frees_registry() {
    let app = app_with_uploader(Arc::new(PanickingUploader)).await;
    let fields = [("source", "https://docs.google.com/spreadsheets/d/abc")];

    let (status, body) = send(&app.router, run_request(&fields, Some(b"clip"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let report = wait_for_terminal(&app.router, &run_id).await;
    assert_eq!(report["state"], "error");
    assert!(report["error"].as_str().unwrap().contains("aborted"));
    assert!(!report["finished_at"].is_null());

    let (status, _) = send(&app.router, run_request(&fields, Some(b"clip"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}
