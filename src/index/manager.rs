//! Per-session index lifecycle: load from disk when possible, otherwise embed and persist.

use super::store::{IndexError, VectorIndex};
use crate::embedding::EmbeddingClient;
use crate::processing::Chunk;
use crate::storage::StorageLayout;
use std::path::PathBuf;
use std::sync::Arc;

/// Builds, persists, and reloads session indexes.
pub struct IndexManager {
    layout: StorageLayout,
    embedding_client: Arc<dyn EmbeddingClient>,
}

impl IndexManager {
    /// Manager writing beneath `layout` and embedding with `embedding_client`.
    pub fn new(layout: StorageLayout, embedding_client: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            layout,
            embedding_client,
        }
    }

    /// Directory that holds the index for `session_id`.
    pub fn index_path(&self, session_id: &str) -> PathBuf {
        self.layout.index_dir(session_id)
    }

    /// Return the index for `session_id`.
    ///
    /// A previously persisted index for the same session wins: it is loaded and `chunks` is
    /// ignored. A directory that fails to load is logged and rebuilt from `chunks`. Embedding
    /// failures propagate.
    pub async fn build_or_load(
        &self,
        chunks: Vec<Chunk>,
        session_id: &str,
    ) -> Result<Arc<VectorIndex>, IndexError> {
        let path = self.index_path(session_id);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(session_id, path = %path.display(), "Loading existing index");
            match VectorIndex::load(&path, self.embedding_client.model()).await {
                Ok(index) => {
                    tracing::info!(
                        session_id,
                        chunks = index.len(),
                        model = index.embedding_model(),
                        "Index loaded"
                    );
                    return Ok(Arc::new(index));
                }
                Err(error) => {
                    tracing::error!(
                        session_id,
                        error = %error,
                        "Failed to load index; rebuilding"
                    );
                }
            }
        } else {
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|source| IndexError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
            tracing::debug!(session_id, path = %path.display(), "Created index directory");
        }

        tracing::info!(session_id, chunks = chunks.len(), "Building new index");
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedding_client.generate_embeddings(texts).await?
        };
        let index = VectorIndex::build(self.embedding_client.model(), chunks, vectors)?;
        index.save(&path).await?;
        tracing::info!(
            session_id,
            chunks = index.len(),
            dimension = index.dimension(),
            model = index.embedding_model(),
            path = %path.display(),
            "Index built and saved"
        );

        Ok(Arc::new(index))
    }
}
