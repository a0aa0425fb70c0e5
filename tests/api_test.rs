#![cfg(unix)]

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bytes::Bytes;
use common::{FakeTool, SHRINKING_TOOL, sample_pdf};
use http_body_util::BodyExt;
use pdf_compression_service::config::AppConfig;
use pdf_compression_service::services::callback::{ErrorReport, JobNotifier, UploadResult};
use pdf_compression_service::services::compression::CompressionExecutor;
use pdf_compression_service::services::encryption::EncryptionService;
use pdf_compression_service::services::job::{JobOrchestrator, JobParameters};
use pdf_compression_service::services::worker::JobWorkerPool;
use pdf_compression_service::{AppState, create_app};
use serde_json::Value;
use tokio::sync::watch;
use tower::ServiceExt;

const TOKEN: &str = "dev-token";
const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

struct SilentNotifier;

#[async_trait]
impl JobNotifier for SilentNotifier {
    async fn upload(&self, _params: &JobParameters, _file: Bytes) -> Option<UploadResult> {
        None
    }

    async fn complete(&self, _params: &JobParameters, _result: &UploadResult) -> Option<String> {
        None
    }

    async fn report_error(&self, _params: &JobParameters, _report: &ErrorReport) -> Option<String> {
        None
    }
}

fn setup_app(tool: &FakeTool) -> (Router, watch::Sender<bool>) {
    let mut config = AppConfig::development();
    config.compression = tool.config();

    let executor = Arc::new(CompressionExecutor::new(&config.compression));
    let orchestrator = JobOrchestrator::new(
        executor.clone(),
        Arc::new(SilentNotifier),
        config.jobs.min_latency,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (jobs, _workers) = JobWorkerPool::start(orchestrator, &config.jobs, shutdown_rx);

    let state = AppState {
        executor,
        jobs,
        config: Arc::new(config),
    };

    (create_app(state), shutdown_tx)
}

fn multipart_body(file_name: &str, content: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/pdf\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let tool = FakeTool::new(SHRINKING_TOOL);
    let (app, _shutdown) = setup_app(&tool);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["maxConcurrent"], 1);
    assert_eq!(body["profile"], "ebook");
}

#[tokio::test]
async fn test_api_requires_bearer_token() {
    let tool = FakeTool::new(SHRINKING_TOOL);
    let (app, _shutdown) = setup_app(&tool);
    let pdf = sample_pdf(1000);

    let response = app
        .clone()
        .oneshot(
            upload_request("/api/compress-pdf")
                .body(Body::from(multipart_body("a.pdf", &pdf)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "invalid_token");

    let response = app
        .oneshot(
            upload_request("/api/compress-pdf")
                .header(header::AUTHORIZATION, "Bearer wrong-token")
                .body(Body::from(multipart_body("a.pdf", &pdf)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sync_compression_returns_pdf() {
    let tool = FakeTool::new(SHRINKING_TOOL);
    let (app, _shutdown) = setup_app(&tool);
    let pdf = sample_pdf(1000);

    let response = app
        .oneshot(
            upload_request("/api/compress-pdf")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .body(Body::from(multipart_body("Annual Report.pdf", &pdf)))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Annual_Report-compressed.pdf\""
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &pdf[..16]);
}

#[tokio::test]
async fn test_sync_rejects_non_pdf() {
    let tool = FakeTool::new(SHRINKING_TOOL);
    let (app, _shutdown) = setup_app(&tool);

    let response = app
        .oneshot(
            upload_request("/api/compress-pdf")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .body(Body::from(multipart_body("a.txt", b"hello, not a pdf")))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["error"],
        "Not a PDF (missing %PDF- header)"
    );
}

#[tokio::test]
async fn test_async_requires_job_headers() {
    let tool = FakeTool::new(SHRINKING_TOOL);
    let (app, _shutdown) = setup_app(&tool);
    let pdf = sample_pdf(1000);

    let response = app
        .oneshot(
            upload_request("/api/compress-pdf/async")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .header("Compression-Id", "c-1")
                .header("Organization-Id", "org1")
                .body(Body::from(multipart_body("a.pdf", &pdf)))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_async_accepts_job() {
    let tool = FakeTool::new(SHRINKING_TOOL);
    let (app, _shutdown) = setup_app(&tool);
    let pdf = sample_pdf(1000);

    let response = app
        .oneshot(
            upload_request("/api/compress-pdf/async")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .header("Compression-Id", "c-1")
                .header("Organization-Id", "org1")
                .header("Decrypt-Key", EncryptionService::new_base64_secret_256())
                .body(Body::from(multipart_body("a.pdf", &pdf)))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["compressionId"], "c-1");
    assert_eq!(body["status"], "accepted");
    assert!(body["acceptedAt"].is_string());
}

#[tokio::test]
async fn test_async_rejects_invalid_payload_before_queueing() {
    let tool = FakeTool::new(SHRINKING_TOOL);
    let (app, _shutdown) = setup_app(&tool);

    let response = app
        .oneshot(
            upload_request("/api/compress-pdf/async")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .header("Compression-Id", "c-1")
                .header("Organization-Id", "org1")
                .header("Decrypt-Key", "a2V5")
                .body(Body::from(multipart_body("a.pdf", b"%PD")))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Empty file");
}

#[tokio::test]
async fn test_encrypt_utils() {
    let tool = FakeTool::new(SHRINKING_TOOL);
    let (app, _shutdown) = setup_app(&tool);
    let key = EncryptionService::new_base64_secret_256();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/encrypt-utils?encrypt=token-B")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .header("Decrypt-Key", key.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["newKey"].as_str().is_some_and(|k| !k.is_empty()));

    let encrypted = body["encrypted"].as_str().unwrap();
    assert!(EncryptionService::is_encrypted(encrypted));
    assert_eq!(EncryptionService::decrypt(encrypted, &key).unwrap(), "token-B");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let tool = FakeTool::new(SHRINKING_TOOL);
    let (app, _shutdown) = setup_app(&tool);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["paths"]["/api/compress-pdf/async"].is_object());
}
