//! Document loading: extension dispatch, text extraction, and chunking.

use super::chunking::chunk_pages;
use super::types::{Chunk, LoaderError, PageText};
use async_trait::async_trait;
use std::path::Path;

/// Supported source formats, selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Paginated PDF; text is extracted per page.
    Pdf,
    /// Plain text (`.txt`).
    Text,
    /// Markdown (`.md`), loaded verbatim.
    Markdown,
}

impl DocumentKind {
    /// Classify `path` by its (case-insensitive) extension.
    pub fn from_path(path: &Path) -> Result<Self, LoaderError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "txt" => Ok(Self::Text),
            "md" => Ok(Self::Markdown),
            _ => Err(LoaderError::UnsupportedFileType(format!(".{extension}"))),
        }
    }
}

/// Turns a file on disk into retrieval chunks.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load `path` and split it into chunks.
    async fn load_and_chunk(&self, path: &Path) -> Result<Vec<Chunk>, LoaderError>;
}

/// Filesystem loader backed by `pdf-extract` and the character chunker.
#[derive(Debug, Clone)]
pub struct FileLoader {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FileLoader {
    /// Build a loader that chunks at `chunk_size` characters with `chunk_overlap` overlap.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }
}

impl Default for FileLoader {
    fn default() -> Self {
        Self::new(
            super::chunking::DEFAULT_CHUNK_SIZE,
            super::chunking::DEFAULT_CHUNK_OVERLAP,
        )
    }
}

#[async_trait]
impl DocumentLoader for FileLoader {
    async fn load_and_chunk(&self, path: &Path) -> Result<Vec<Chunk>, LoaderError> {
        let pages = load_document(path).await?;
        let source = path.display().to_string();
        let chunks = chunk_pages(&pages, &source, self.chunk_size, self.chunk_overlap)?;
        tracing::info!(
            path = %source,
            pages = pages.len(),
            chunks = chunks.len(),
            "Loaded and chunked document"
        );
        Ok(chunks)
    }
}

/// Read `path` into page texts according to its extension.
pub async fn load_document(path: &Path) -> Result<Vec<PageText>, LoaderError> {
    let kind = DocumentKind::from_path(path)?;
    let display = path.display().to_string();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| LoaderError::Io {
            path: display.clone(),
            source,
        })?;

    match kind {
        DocumentKind::Pdf => {
            let pages = tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text_from_mem_by_pages(&bytes)
            })
            .await
            .map_err(|error| LoaderError::Pdf {
                path: display.clone(),
                message: format!("extraction task failed: {error}"),
            })?
            .map_err(|error| LoaderError::Pdf {
                path: display.clone(),
                message: error.to_string(),
            })?;
            Ok(pages
                .into_iter()
                .enumerate()
                .map(|(idx, text)| PageText {
                    page: Some(idx + 1),
                    text,
                })
                .collect())
        }
        DocumentKind::Text | DocumentKind::Markdown => {
            let text = String::from_utf8(bytes).map_err(|_| LoaderError::Encoding { path: display })?;
            Ok(vec![PageText { page: None, text }])
        }
    }
}
