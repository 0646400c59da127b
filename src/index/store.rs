//! Flat exact-search vector index with a checksummed on-disk format.
//!
//! An index directory holds two files. `chunks.json` carries every chunk with its vector;
//! `manifest.json` records the format version, embedding model, dimension, chunk count and the
//! SHA-256 of `chunks.json`. The manifest is written last, so a directory whose write was
//! interrupted never validates.

use crate::processing::Chunk;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const FORMAT_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.json";

/// Errors raised while building, searching, or (de)serializing an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Filesystem access failed.
    #[error("Index I/O failed at {path}: {source}")]
    Io {
        /// Path being read or written.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A persisted file was not valid JSON for its schema.
    #[error("Index file {path} is malformed: {source}")]
    Json {
        /// File being decoded.
        path: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// Persisted state failed validation.
    #[error("Index is corrupt: {0}")]
    Corrupt(String),
    /// A vector did not have the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Embedding provider failed while building the index or embedding a query.
    #[error(transparent)]
    Embedding(#[from] crate::embedding::EmbeddingClientError),
}

/// A chunk stored together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    /// Chunk text and provenance.
    pub chunk: Chunk,
    /// Embedding of `chunk.text`.
    pub vector: Vec<f32>,
}

/// A search hit with its squared L2 distance to the query (lower is closer).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Matched chunk.
    pub chunk: Chunk,
    /// Squared Euclidean distance between query and chunk vectors.
    pub distance: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    embedding_model: String,
    dimension: usize,
    chunk_count: usize,
    checksum: String,
    created_at: String,
}

/// Immutable similarity index over one session's chunks.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    embedding_model: String,
    dimension: usize,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// Pair chunks with their vectors. All vectors must share one dimension.
    pub fn build(
        embedding_model: impl Into<String>,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::Corrupt(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        Ok(Self {
            embedding_model: embedding_model.into(),
            dimension,
            entries: chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexedChunk { chunk, vector })
                .collect(),
        })
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension (0 for an empty index).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embedding model the vectors were produced with.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Indexed chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    /// Exact nearest-neighbour search by squared L2 distance.
    ///
    /// Returns up to `k` hits, closest first; ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (idx, squared_l2(query, &entry.vector)))
            .collect();
        scored.sort_by(|left, right| left.1.total_cmp(&right.1).then(left.0.cmp(&right.0)));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(idx, distance)| ScoredChunk {
                chunk: self.entries[idx].chunk.clone(),
                distance,
            })
            .collect())
    }

    /// Persist to `dir`, which must already exist.
    pub async fn save(&self, dir: &Path) -> Result<(), IndexError> {
        let chunks_path = dir.join(CHUNKS_FILE);
        let payload = serde_json::to_vec(&self.entries).map_err(|source| IndexError::Json {
            path: chunks_path.display().to_string(),
            source,
        })?;
        write_file(&chunks_path, &payload).await?;

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            embedding_model: self.embedding_model.clone(),
            dimension: self.dimension,
            chunk_count: self.entries.len(),
            checksum: checksum(&payload),
            created_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        };
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest_bytes =
            serde_json::to_vec_pretty(&manifest).map_err(|source| IndexError::Json {
                path: manifest_path.display().to_string(),
                source,
            })?;
        write_file(&manifest_path, &manifest_bytes).await
    }

    /// Load from `dir`, rejecting anything built with a different embedding model or failing
    /// checksum and shape validation.
    pub async fn load(dir: &Path, expected_model: &str) -> Result<Self, IndexError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest: Manifest = decode(&manifest_path, &read_file(&manifest_path).await?)?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {}",
                manifest.format_version
            )));
        }
        if manifest.embedding_model != expected_model {
            return Err(IndexError::Corrupt(format!(
                "built with embedding model '{}', expected '{expected_model}'",
                manifest.embedding_model
            )));
        }

        let chunks_path = dir.join(CHUNKS_FILE);
        let payload = read_file(&chunks_path).await?;
        if checksum(&payload) != manifest.checksum {
            return Err(IndexError::Corrupt("checksum mismatch".into()));
        }
        let entries: Vec<IndexedChunk> = decode(&chunks_path, &payload)?;
        if entries.len() != manifest.chunk_count {
            return Err(IndexError::Corrupt(format!(
                "manifest lists {} chunks, found {}",
                manifest.chunk_count,
                entries.len()
            )));
        }
        if let Some(bad) = entries
            .iter()
            .find(|entry| entry.vector.len() != manifest.dimension)
        {
            return Err(IndexError::DimensionMismatch {
                expected: manifest.dimension,
                actual: bad.vector.len(),
            });
        }

        Ok(Self {
            embedding_model: manifest.embedding_model,
            dimension: manifest.dimension,
            entries,
        })
    }
}

fn squared_l2(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(a, b)| (a - b) * (a - b))
        .sum()
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

async fn read_file(path: &Path) -> Result<Vec<u8>, IndexError> {
    tokio::fs::read(path).await.map_err(|source| IndexError::Io {
        path: path.display().to_string(),
        source,
    })
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| IndexError::Io {
            path: path.display().to_string(),
            source,
        })
}

fn decode<T: serde::de::DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T, IndexError> {
    serde_json::from_slice(bytes).map_err(|source| IndexError::Json {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> VectorIndex {
        VectorIndex::build(
            "test-model",
            vec![
                Chunk::new("alpha", "doc.pdf", Some(1)),
                Chunk::new("beta", "doc.pdf", Some(1)),
                Chunk::new("gamma", "doc.pdf", Some(2)),
            ],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]],
        )
        .expect("index")
    }

    #[test]
    fn search_orders_by_distance_and_keeps_insertion_order_on_ties() {
        let index = sample_index();
        let hits = index.search(&[0.9, 0.1], 3).expect("hits");
        let texts: Vec<&str> = hits.iter().map(|hit| hit.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "gamma", "beta"]);
        assert!(hits[0].distance <= hits[2].distance);
    }

    #[test]
    fn search_returns_at_most_k_and_handles_empty_index() {
        let index = sample_index();
        assert_eq!(index.search(&[0.0, 1.0], 1).expect("hits").len(), 1);
        assert_eq!(index.search(&[0.0, 1.0], 10).expect("hits").len(), 3);

        let empty = VectorIndex::build("test-model", vec![], vec![]).expect("empty");
        assert!(empty.search(&[1.0, 2.0, 3.0], 5).expect("hits").is_empty());
    }

    #[test]
    fn search_rejects_query_of_wrong_dimension() {
        let error = sample_index().search(&[1.0, 0.0, 0.0], 2).unwrap_err();
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn build_rejects_ragged_vectors() {
        let error = VectorIndex::build(
            "m",
            vec![Chunk::new("a", "s", None), Chunk::new("b", "s", None)],
            vec![vec![1.0, 0.0], vec![1.0]],
        )
        .unwrap_err();
        assert!(matches!(error, IndexError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn save_then_load_preserves_chunks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = sample_index();
        index.save(dir.path()).await.expect("save");

        let loaded = VectorIndex::load(dir.path(), "test-model")
            .await
            .expect("load");
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.dimension(), 2);
        assert_eq!(loaded.embedding_model(), "test-model");
        assert_eq!(
            loaded.chunks().cloned().collect::<Vec<_>>(),
            index.chunks().cloned().collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn load_detects_tampered_chunks() {
        let dir = tempfile::tempdir().expect("tempdir");
        sample_index().save(dir.path()).await.expect("save");
        tokio::fs::write(dir.path().join(CHUNKS_FILE), b"[]")
            .await
            .unwrap();

        let error = VectorIndex::load(dir.path(), "test-model")
            .await
            .unwrap_err();
        assert!(matches!(error, IndexError::Corrupt(message) if message.contains("checksum")));
    }

    #[tokio::test]
    async fn load_rejects_other_embedding_model() {
        let dir = tempfile::tempdir().expect("tempdir");
        sample_index().save(dir.path()).await.expect("save");

        let error = VectorIndex::load(dir.path(), "another-model")
            .await
            .unwrap_err();
        assert!(matches!(error, IndexError::Corrupt(_)));
    }

    #[tokio::test]
    async fn load_of_empty_directory_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = VectorIndex::load(dir.path(), "test-model")
            .await
            .unwrap_err();
        assert!(matches!(error, IndexError::Io { .. }));
    }
}
