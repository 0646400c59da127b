use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use docchat::{
    api,
    config::Config,
    embedding::HashEmbeddingClient,
    generation::{GenerationClient, GenerationClientError, GenerationRequest},
    processing::{Chunk, DocumentLoader, FileLoader, LoaderError},
    service::DocumentService,
    session::InMemorySessionStore,
};
use serde_json::Value;
use time::OffsetDateTime;
use tower::ServiceExt;

const BOUNDARY: &str = "docchat-e2e";

struct ThreeChunkLoader;

#[async_trait]
impl DocumentLoader for ThreeChunkLoader {
    async fn load_and_chunk(&self, path: &Path) -> Result<Vec<Chunk>, LoaderError> {
        let source = path.display().to_string();
        Ok(vec![
            Chunk::new("The warranty period is two years.", &source, Some(1)),
            Chunk::new("Returns are accepted within thirty days.", &source, Some(2)),
            Chunk::new("Support is available on weekdays.", &source, Some(3)),
        ])
    }
}

/// Answers with the first context line so tests can see which chunk ranked first.
struct EchoContextGenerator;

#[async_trait]
impl GenerationClient for EchoContextGenerator {
    fn model(&self) -> &str {
        "echo"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let context = request
            .prompt
            .split("Context:\n")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .unwrap_or("I don't know.");
        Ok(context.to_string())
    }
}

fn build(data_dir: &Path) -> (Arc<DocumentService>, Router) {
    build_with_loader(data_dir, Arc::new(ThreeChunkLoader))
}

fn build_with_loader(
    data_dir: &Path,
    loader: Arc<dyn DocumentLoader>,
) -> (Arc<DocumentService>, Router) {
    let config = Config {
        data_dir: data_dir.to_path_buf(),
        ..Config::default()
    };
    let service = Arc::new(DocumentService::with_components(
        &config,
        loader,
        Arc::new(HashEmbeddingClient::new(128)),
        Arc::new(EchoContextGenerator),
        Arc::new(InMemorySessionStore::new()),
    ));
    let router = api::create_router(service.clone(), config.max_upload_bytes);
    (service, router)
}

fn upload(file_name: &str) -> Request<Body> {
    upload_bytes(file_name, b"%PDF-1.4 test document")
}

fn upload_bytes(file_name: &str, contents: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}

fn chat(session_id: &str, query: &str) -> Request<Body> {
    let form = format!(
        "session_id={session_id}&query={}",
        query.replace(' ', "+").replace('?', "%3F")
    );
    Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .expect("request")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, serde_json::from_slice(&body).expect("json"))
}

#[tokio::test]
async fn upload_then_chat_returns_grounded_answer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (service, router) = build(dir.path());

    let (status, body) = send(&router, upload("doc.pdf")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "PDF uploaded and indexed successfully.");
    let session_id = body["session_id"].as_str().expect("session id").to_string();
    assert!(service.layout().upload_path(&session_id).exists());

    let (status, body) = send(&router, chat(&session_id, "How long is the warranty period?")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "The warranty period is two years.");

    let (status, body) = send(
        &router,
        Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["documents_indexed"], 1);
    assert_eq!(body["chunks_indexed"], 3);
    assert_eq!(body["questions_answered"], 1);
    assert_eq!(body["active_sessions"], 1);
}

#[tokio::test]
async fn real_pdf_is_extracted_indexed_and_answered() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_service, router) = build_with_loader(dir.path(), Arc::new(FileLoader::new(500, 100)));

    let pdf = include_bytes!("fixtures/three_pages.pdf");
    let (status, body) = send(&router, upload_bytes("manual.pdf", pdf)).await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["session_id"].as_str().expect("session id").to_string();

    let (status, body) = send(&router, chat(&session_id, "How long is the warranty period?")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        body["answer"].as_str().expect("answer").contains("warranty"),
        "unexpected answer: {body}"
    );

    let (status, body) = send(
        &router,
        Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunks_indexed"], 3);
}

#[tokio::test]
async fn expired_session_is_swept_and_then_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (service, router) = build(dir.path());

    let (_, body) = send(&router, upload("doc.pdf")).await;
    let session_id = body["session_id"].as_str().expect("session id").to_string();
    let index_dir = service.layout().index_dir(&session_id);
    assert!(index_dir.exists());

    let two_hours_later = OffsetDateTime::now_utc() + Duration::from_secs(2 * 3600);
    let report = service.sweeper().sweep_once(two_hours_later).await;
    assert_eq!(report.purged, vec![session_id.clone()]);
    assert!(!index_dir.exists());
    assert!(!service.layout().upload_path(&session_id).exists());

    let (status, body) = send(&router, chat(&session_id, "anything")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Session ID not found. Upload a PDF first.");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_, router) = build(dir.path());

    let (status, body) = send(&router, chat("00000000-0000-0000-0000-000000000000", "hi")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Session ID not found. Upload a PDF first.");
}

#[tokio::test]
async fn non_pdf_upload_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (service, router) = build(dir.path());

    let (status, body) = send(&router, upload("notes.txt")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Only PDF files are supported.");
    assert_eq!(service.sessions().len().await, 0);
}

#[tokio::test]
async fn sessions_are_isolated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (service, router) = build(dir.path());

    let (_, first) = send(&router, upload("a.pdf")).await;
    let (_, second) = send(&router, upload("b.pdf")).await;
    let first = first["session_id"].as_str().expect("first").to_string();
    let second = second["session_id"].as_str().expect("second").to_string();
    assert_ne!(first, second);
    assert_eq!(service.sessions().len().await, 2);

    service.sessions().delete(&first).await;
    let (status, _) = send(&router, chat(&first, "warranty")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&router, chat(&second, "warranty")).await;
    assert_eq!(status, StatusCode::OK);
}
