//! Document processing: loading files and splitting them into retrieval chunks.

pub mod chunking;
pub mod loader;
pub mod types;

pub use chunking::{chunk_pages, chunk_text};
pub use loader::{DocumentKind, DocumentLoader, FileLoader, load_document};
pub use types::{Chunk, ChunkMetadata, ChunkingError, LoaderError, PageText};
