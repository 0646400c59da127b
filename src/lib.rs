#![deny(missing_docs)]

//! Core library for the docchat PDF question-answering server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Answer generation clients.
pub mod generation;
/// Per-session vector indexes and their persistence.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Service counters.
pub mod metrics;
/// Document loading and chunking.
pub mod processing;
/// Prompt assembly.
pub mod prompt;
/// Query-time chunk retrieval.
pub mod retrieval;
/// Upload and chat orchestration.
pub mod service;
/// Session registry and expiry sweeper.
pub mod session;
/// Data directory layout and artifact cleanup.
pub mod storage;
