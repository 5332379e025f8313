#![deny(missing_docs)]

//! Core library for the ragserve retrieval-augmented question answering service.

/// HTTP routing and REST handlers.
pub mod api;
/// Startup assembly and router layering.
pub mod app;
/// Environment-driven configuration management.
pub mod config;
/// Document loading and chunking.
pub mod documents;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Language-model client abstraction and the Ollama adapter.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query counters.
pub mod metrics;
/// Ingest and query orchestration.
pub mod pipeline;
/// Qdrant vector store integration.
pub mod qdrant;
