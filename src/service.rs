//! Upload and chat orchestration shared by the HTTP surface.
//!
//! [`DocumentService`] owns the long-lived components (loader, index manager, retriever, answer
//! generator, session store, metrics). Construct it once near process start and share it through
//! an `Arc`.

use crate::config::Config;
use crate::embedding::{EmbeddingClient, EmbeddingClientError, build_embedding_client};
use crate::generation::{
    GenerationClient, GenerationClientError, GenerationRequest, build_generation_client,
};
use crate::index::{IndexError, IndexManager};
use crate::metrics::{MetricsSnapshot, ServiceMetrics};
use crate::processing::{DocumentLoader, FileLoader, LoaderError};
use crate::prompt::build_prompt;
use crate::retrieval::Retriever;
use crate::session::{InMemorySessionStore, SessionEntry, SessionStore, Sweeper};
use crate::storage::{StorageLayout, remove_artifacts};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors surfaced by upload and chat operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The uploaded file is not a PDF.
    #[error("Only PDF files are supported.")]
    UnsupportedUpload,
    /// No live session has this id.
    #[error("Session ID not found. Upload a PDF first.")]
    SessionNotFound(String),
    /// Reading or chunking the upload failed.
    #[error(transparent)]
    Loader(#[from] LoaderError),
    /// Building, loading, or searching an index failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// The embedding provider could not be set up.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// The language model failed to answer.
    #[error(transparent)]
    Generation(#[from] GenerationClientError),
    /// Writing the upload to disk failed.
    #[error("Failed to write {path}: {source}")]
    Io {
        /// Path being written.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Identifier for subsequent chat requests.
    pub session_id: String,
    /// Chunks indexed for the document.
    pub chunk_count: usize,
}

/// Result of a successful chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    /// Model answer.
    pub answer: String,
}

/// Operations exposed to the HTTP layer.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Store, index, and register an uploaded PDF.
    async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<UploadOutcome, ServiceError>;

    /// Answer `query` against the document registered under `session_id`.
    async fn chat(&self, session_id: &str, query: &str) -> Result<ChatOutcome, ServiceError>;

    /// Current counters.
    async fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Default [`DocumentApi`] implementation.
pub struct DocumentService {
    layout: StorageLayout,
    loader: Arc<dyn DocumentLoader>,
    index_manager: IndexManager,
    retriever: Retriever,
    generator: Arc<dyn GenerationClient>,
    sessions: Arc<dyn SessionStore>,
    metrics: Arc<ServiceMetrics>,
    max_tokens: u32,
    session_expiry: std::time::Duration,
    sweep_interval: std::time::Duration,
}

impl DocumentService {
    /// Build the service with providers selected by `config` and an in-memory session store.
    pub fn new(config: &Config) -> Result<Self, ServiceError> {
        let embedding_client = build_embedding_client(config)?;
        let generator = build_generation_client(config)?;
        let loader = Arc::new(FileLoader::new(config.chunk_size, config.chunk_overlap));
        Ok(Self::with_components(
            config,
            loader,
            embedding_client,
            generator,
            Arc::new(InMemorySessionStore::new()),
        ))
    }

    /// Build the service from explicit components.
    pub fn with_components(
        config: &Config,
        loader: Arc<dyn DocumentLoader>,
        embedding_client: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn GenerationClient>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let layout = StorageLayout::new(&config.data_dir);
        Self {
            index_manager: IndexManager::new(layout.clone(), embedding_client.clone()),
            retriever: Retriever::new(embedding_client, config.retrieval_top_k),
            layout,
            loader,
            generator,
            sessions,
            metrics: Arc::new(ServiceMetrics::new()),
            max_tokens: config.generation_max_tokens,
            session_expiry: config.session_expiry(),
            sweep_interval: config.sweep_interval(),
        }
    }

    /// Storage layout under the data directory.
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Shared session store.
    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        self.sessions.clone()
    }

    /// Sweeper over this service's sessions, reporting into its metrics.
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            self.sessions.clone(),
            self.session_expiry,
            self.sweep_interval,
        )
        .with_metrics(self.metrics.clone())
    }

    async fn index_upload(
        &self,
        session_id: &str,
        upload_path: &Path,
        created_at: OffsetDateTime,
    ) -> Result<SessionEntry, ServiceError> {
        let chunks = self.loader.load_and_chunk(upload_path).await?;
        let index = self.index_manager.build_or_load(chunks, session_id).await?;
        Ok(SessionEntry {
            session_id: session_id.to_string(),
            created_at,
            upload_path: upload_path.to_path_buf(),
            index_dir: self.index_manager.index_path(session_id),
            index,
        })
    }
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<UploadOutcome, ServiceError> {
        if !file_name.ends_with(".pdf") {
            tracing::warn!(file_name, "Rejected non-PDF upload");
            return Err(ServiceError::UnsupportedUpload);
        }

        let created_at = OffsetDateTime::now_utc();
        let session_id = Uuid::new_v4().to_string();
        let upload_path = self.layout.upload_path(&session_id);
        let io_error = |source| ServiceError::Io {
            path: upload_path.display().to_string(),
            source,
        };
        tokio::fs::create_dir_all(self.layout.uploads_dir())
            .await
            .map_err(io_error)?;
        tokio::fs::write(&upload_path, bytes)
            .await
            .map_err(io_error)?;
        tracing::info!(
            session_id = %session_id,
            file_name,
            bytes = bytes.len(),
            "Stored upload"
        );

        let entry = match self
            .index_upload(&session_id, &upload_path, created_at)
            .await {
            Ok(entry) => entry,
            Err(error) => {
                tracing::error!(session_id = %session_id, error = %error, "Upload indexing failed");
                let index_dir = self.index_manager.index_path(&session_id);
                if let Err(cleanup) = remove_artifacts(&index_dir, &upload_path).await {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %cleanup,
                        "Failed to clean up after upload failure"
                    );
                }
                return Err(error);
            }
        };

        let chunk_count = entry.index.len();
        self.sessions.put(entry).await;
        self.metrics.record_document(chunk_count as u64);
        tracing::info!(session_id = %session_id, chunks = chunk_count, "Session registered");

        Ok(UploadOutcome {
            session_id,
            chunk_count,
        })
    }

    async fn chat(&self, session_id: &str, query: &str) -> Result<ChatOutcome, ServiceError> {
        let entry = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))?;
        // The sweeper may not have run yet; an entry past its TTL is already gone.
        if entry.is_expired(OffsetDateTime::now_utc(), self.session_expiry) {
            tracing::debug!(session_id, "Session expired before sweep");
            return Err(ServiceError::SessionNotFound(session_id.to_string()));
        }

        let chunks = self.retriever.retrieve(query, &entry.index).await?;
        let prompt = build_prompt(query, &chunks);
        tracing::debug!(
            session_id,
            chunks = chunks.len(),
            top_k = self.retriever.top_k(),
            prompt_chars = prompt.len(),
            "Generating answer"
        );

        let answer = self
            .generator
            .generate(GenerationRequest {
                model: self.generator.model().to_string(),
                prompt,
                max_tokens: self.max_tokens,
            })
            .await?;
        self.metrics.record_answer();
        tracing::info!(session_id, answer_chars = answer.len(), "Question answered");

        Ok(ChatOutcome { answer })
    }

    async fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.sessions.len().await)
    }
}
