//! Retrieval-augmented ingest and query orchestration.

mod service;
mod types;

pub use service::{PipelineSettings, RagApi, RagPipeline, RagService, sanitize_filename};
pub use types::{
    HealthSnapshot, IngestOutcome, NO_CONTEXT_ANSWER, PipelineError, QueryAnswer, QueryOutcome,
    QueryRequest, SourceRef, StreamingAnswer,
};
