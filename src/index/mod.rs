//! Per-session vector indexes: the flat similarity store and its build/load manager.

pub mod manager;
pub mod store;

pub use manager::IndexManager;
pub use store::{IndexError, IndexedChunk, ScoredChunk, VectorIndex};
