//! Core data types and error definitions for document loading and chunking.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while turning page text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible chunk budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Errors produced while reading a document from disk.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// File extension is not one of `.pdf`, `.txt`, `.md`.
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path we attempted to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The PDF parser rejected the file.
    #[error("Failed to parse PDF {path}: {message}")]
    Pdf {
        /// Path of the rejected document.
        path: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Text content was not valid UTF-8.
    #[error("{path} is not valid UTF-8")]
    Encoding {
        /// Path of the rejected document.
        path: String,
    },
    /// Chunking the extracted text failed.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
}

/// Text of a single page (or of a whole plain-text document).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number for paginated formats.
    pub page: Option<usize>,
    /// Extracted text.
    pub text: String,
}

/// Provenance attached to every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path of the originating document.
    pub source: String,
    /// 1-based page number, when the source is paginated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
}

/// A bounded span of document text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text.
    pub text: String,
    /// Where the text came from.
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Build a chunk from text and its source.
    pub fn new(text: impl Into<String>, source: impl Into<String>, page: Option<usize>) -> Self {
        Self {
            text: text.into(),
            metadata: ChunkMetadata {
                source: source.into(),
                page,
            },
        }
    }
}
