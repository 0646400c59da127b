//! Query-time retrieval of the chunks closest to a question.

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::index::{IndexError, ScoredChunk, VectorIndex};
use crate::processing::Chunk;
use std::sync::Arc;

/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 5;

/// Embeds questions and ranks index chunks against them.
pub struct Retriever {
    embedding_client: Arc<dyn EmbeddingClient>,
    top_k: usize,
}

impl Retriever {
    /// Retriever returning up to `top_k` chunks per query.
    pub fn new(embedding_client: Arc<dyn EmbeddingClient>, top_k: usize) -> Self {
        Self {
            embedding_client,
            top_k,
        }
    }

    /// Configured result count.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Up to `top_k` chunks of `index`, most relevant first. There is no relevance cutoff.
    pub async fn retrieve(&self, query: &str, index: &VectorIndex) -> Result<Vec<Chunk>, IndexError> {
        Ok(self
            .retrieve_scored(query, index)
            .await?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect())
    }

    /// Like [`Retriever::retrieve`] but keeps each hit's distance.
    pub async fn retrieve_scored(
        &self,
        query: &str,
        index: &VectorIndex,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        if index.is_empty() {
            return Ok(Vec::new());
        }
        let mut vectors = self
            .embedding_client
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let vector = vectors.pop().ok_or_else(|| {
            EmbeddingClientError::InvalidResponse("no vector returned for query".into())
        })?;
        let hits = index.search(&vector, self.top_k)?;
        tracing::debug!(
            hits = hits.len(),
            best_distance = ?hits.first().map(|hit| hit.distance),
            "Retrieved chunks"
        );
        Ok(hits)
    }
}
