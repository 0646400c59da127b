//! HTTP surface for docchat.
//!
//! - `POST /upload` – Multipart upload (field `file`) of a PDF. Stores and indexes it, then
//!   returns `{"session_id", "message"}`.
//! - `POST /chat` – Form fields `session_id` and `query`; returns `{"answer"}` grounded in the
//!   uploaded document.
//! - `GET /metrics` – Upload, chat, and sweep counters plus the live session count.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Failures are JSON `{"error": "<message>"}` with 400 for rejected uploads, 404 for unknown
//! sessions, and 500 otherwise.

use crate::metrics::MetricsSnapshot;
use crate::service::{DocumentApi, ServiceError};
use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const UPLOAD_SUCCESS_MESSAGE: &str = "PDF uploaded and indexed successfully.";

/// Build the HTTP router. Request bodies are capped at `max_upload_bytes`.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: DocumentApi + 'static,
{
    Router::new()
        .route("/upload", post(upload_document::<S>))
        .route("/chat", post(chat::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

/// Success response for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    session_id: String,
    message: &'static str,
}

/// Store and index the uploaded PDF, opening a new session.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: DocumentApi,
{
    let (file_name, bytes) = extract_file(&mut multipart).await?;
    let outcome = service.upload(&file_name, &bytes).await?;
    tracing::info!(
        session_id = %outcome.session_id,
        chunks = outcome.chunk_count,
        "Upload request completed"
    );
    Ok(Json(UploadResponse {
        session_id: outcome.session_id,
        message: UPLOAD_SUCCESS_MESSAGE,
    }))
}

async fn extract_file(multipart: &mut Multipart) -> Result<(String, Vec<u8>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::BadRequest(error.to_string()))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|error| AppError::BadRequest(error.to_string()))?;
            return Ok((file_name, bytes.to_vec()));
        }
    }
    Err(AppError::BadRequest("Missing file field.".into()))
}

/// Form body for `POST /chat`.
#[derive(Deserialize)]
struct ChatRequest {
    session_id: String,
    query: String,
}

/// Success response for `POST /chat`.
#[derive(Serialize)]
struct ChatResponse {
    answer: String,
}

/// Answer a question against a session's document.
async fn chat<S>(
    State(service): State<Arc<S>>,
    Form(request): Form<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError>
where
    S: DocumentApi,
{
    let outcome = service.chat(&request.session_id, &request.query).await?;
    Ok(Json(ChatResponse {
        answer: outcome.answer,
    }))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: DocumentApi,
{
    Json(service.metrics_snapshot().await)
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    content_type: &'static str,
    description: &'static str,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/upload",
                content_type: "multipart/form-data",
                description: "Upload a PDF in the `file` field. Returns { \"session_id\": string, \"message\": string }.",
            },
            CommandDescriptor {
                name: "chat",
                method: "POST",
                path: "/chat",
                content_type: "application/x-www-form-urlencoded",
                description: "Ask a question with `session_id` and `query`. Returns { \"answer\": string }.",
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                content_type: "application/json",
                description: "Return upload, chat, and sweep counters.",
            },
        ],
    })
}

enum AppError {
    BadRequest(String),
    Service(ServiceError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Service(error) => {
                let status = match &error {
                    ServiceError::UnsupportedUpload => StatusCode::BAD_REQUEST,
                    ServiceError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                    _ => {
                        tracing::error!(error = %error, "Request failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, error.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        Self::Service(inner)
    }
}
