//! Request, response and error types for the retrieval pipeline.

use crate::{
    documents::DocumentError,
    embedding::EmbeddingClientError,
    llm::{LanguageModelError, TokenStream},
    qdrant::QdrantError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Answer returned when retrieval finds nothing above the score threshold.
pub const NO_CONTEXT_ANSWER: &str =
    "I don't have any relevant information to answer this question.";

/// Errors surfaced by ingestion and query orchestration.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller supplied an unusable request (blank question, zero `top_k`, missing upload).
    #[error("{0}")]
    InvalidRequest(String),
    /// Document produced no chunks to embed.
    #[error("Document '{0}' contains no extractable text")]
    EmptyDocument(String),
    /// Loading or splitting the document failed.
    #[error(transparent)]
    Document(#[from] DocumentError),
    /// Embedding provider failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Embedder produced vectors of an unexpected length.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured for the collection.
        expected: usize,
        /// Dimension the embedder returned.
        actual: usize,
    },
    /// Vector store call failed.
    #[error("Vector store request failed: {0}")]
    Store(#[from] QdrantError),
    /// Language model call failed.
    #[error(transparent)]
    LanguageModel(#[from] LanguageModelError),
    /// Background task panicked or was cancelled.
    #[error("Internal task failure: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable machine-readable tag for API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::EmptyDocument(_) => "empty_document",
            Self::Document(DocumentError::UnsupportedFileType(_)) => "unsupported_file_type",
            Self::Document(_) => "document_processing",
            Self::Embedding(_) => "embedding",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::Store(error) if error.is_unavailable() => "vector_store_unavailable",
            Self::Store(_) => "vector_store",
            Self::LanguageModel(LanguageModelError::Transient(_)) => "llm_unavailable",
            Self::LanguageModel(LanguageModelError::Config(_)) => "llm_config",
            Self::LanguageModel(LanguageModelError::InvalidResponse(_)) => "llm_invalid_response",
            Self::Internal(_) => "internal",
        }
    }
}

/// Body of `POST /query` and `POST /query/stream`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryRequest {
    /// Natural-language question.
    pub question: String,
    /// Number of chunks to retrieve; the server default applies when absent.
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Retrieved chunk cited by an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Document the chunk came from, `"unknown"` when not recorded.
    pub source: String,
    /// Similarity score reported by the vector store.
    pub score: f32,
    /// Position of the chunk within its document, `0` when not recorded.
    pub chunk_index: u64,
}

/// Whether the model was consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutcome {
    /// Context was retrieved and the model produced the answer.
    Answered,
    /// Nothing cleared the score threshold; the fixed reply was returned.
    NoContext,
}

/// Result of a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    /// Question as asked.
    pub question: String,
    /// Generated or fixed answer text.
    pub answer: String,
    /// Retrieved chunks, best score first.
    pub sources: Vec<SourceRef>,
    /// Number of chunks given to the model.
    pub context_used: usize,
    /// Whether an answer was generated.
    pub outcome: QueryOutcome,
}

/// Retrieval result whose answer arrives incrementally.
pub struct StreamingAnswer {
    /// Retrieved chunks, best score first.
    pub sources: Vec<SourceRef>,
    /// Number of chunks given to the model.
    pub context_used: usize,
    /// Whether the model is generating the answer.
    pub outcome: QueryOutcome,
    /// Answer fragments in order.
    pub tokens: TokenStream,
}

impl std::fmt::Debug for StreamingAnswer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingAnswer")
            .field("sources", &self.sources)
            .field("context_used", &self.context_used)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

/// Result of ingesting one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    /// Always `"success"`; failures are errors.
    pub status: String,
    /// Number of chunks stored.
    pub documents_ingested: usize,
    /// Human-readable summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Reachability of the downstream services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Ollama answered its tag listing.
    pub ollama_connected: bool,
    /// Qdrant answered its collection listing.
    pub qdrant_connected: bool,
}

impl HealthSnapshot {
    /// `"healthy"` when every dependency is reachable, otherwise `"degraded"`.
    pub fn status(&self) -> &'static str {
        if self.ollama_connected && self.qdrant_connected {
            "healthy"
        } else {
            "degraded"
        }
    }
}
