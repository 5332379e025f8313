//! Retrieval pipeline coordinating embedding, vector storage and generation.

use super::types::{
    HealthSnapshot, IngestOutcome, NO_CONTEXT_ANSWER, PipelineError, QueryAnswer, QueryOutcome,
    QueryRequest, SourceRef, StreamingAnswer,
};
use crate::{
    config::Config,
    documents::{Chunk, DocumentError, DocumentKind, DocumentProcessor},
    embedding::EmbeddingClient,
    llm::LanguageModel,
    metrics::{MetricsSnapshot, PipelineMetrics},
    qdrant::{PointInsert, ScoredPoint, VectorStore},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Map, Value};
use std::{io::Write, path::Path, sync::Arc};

/// Retrieval knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Collection every operation targets.
    pub collection: String,
    /// Vector length shared by the embedder and the collection.
    pub dimension: usize,
    /// Minimum similarity a chunk needs to be used as context.
    pub score_threshold: f32,
    /// `top_k` applied when a request omits it.
    pub default_top_k: usize,
    /// Upper bound applied to requested `top_k`.
    pub max_top_k: usize,
}

impl PipelineSettings {
    /// Extract the pipeline knobs from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.qdrant_collection_name.clone(),
            dimension: config.embedding_dimension,
            score_threshold: config.retrieval_score_threshold,
            default_top_k: config.default_top_k,
            max_top_k: config.max_top_k,
        }
    }
}

/// Stateless orchestration of ingest and query over shared service handles.
///
/// All persistent state lives in the vector store. Each request runs its embed, store and
/// generate calls in sequence; concurrent ingests of the same content store duplicates.
pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LanguageModel>,
    settings: PipelineSettings,
    metrics: Arc<PipelineMetrics>,
}

impl RagPipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            settings,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Embed every chunk in one batch and store them with their provenance.
    ///
    /// Any failure aborts the whole document; nothing reports partial success.
    pub async fn ingest(
        &self,
        source: &str,
        chunks: Vec<Chunk>,
    ) -> Result<IngestOutcome, PipelineError> {
        if chunks.is_empty() {
            return Err(PipelineError::EmptyDocument(source.to_string()));
        }
        let collection = &self.settings.collection;
        self.store
            .ensure_collection(collection, self.settings.dimension as u64)
            .await?;

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.generate_embeddings(texts).await?;
        if vectors.len() != chunks.len() {
            return Err(PipelineError::Internal(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        for vector in &vectors {
            self.check_dimension(vector)?;
        }

        let records: Vec<PointInsert> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| PointInsert {
                metadata: chunk.metadata.to_payload(),
                text: chunk.text,
                vector,
            })
            .collect();
        let summary = self.store.add(collection, records).await?;

        self.metrics.record_document(summary.inserted as u64);
        tracing::info!(
            collection = %collection,
            source,
            chunks = summary.inserted,
            "Document ingested"
        );

        Ok(IngestOutcome {
            status: "success".into(),
            documents_ingested: summary.inserted,
            message: Some(format!("Successfully ingested {source}")),
        })
    }

    /// Answer `request.question` from retrieved context.
    ///
    /// When nothing clears the score threshold the fixed no-context answer is returned and the
    /// language model is not called.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryAnswer, PipelineError> {
        let (question, top_k) = self.validate(&request)?;
        let hits = self.retrieve(question, top_k).await?;

        if hits.is_empty() {
            self.metrics.record_no_context();
            tracing::info!(top_k, "No context above threshold");
            return Ok(QueryAnswer {
                question: request.question,
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                context_used: 0,
                outcome: QueryOutcome::NoContext,
            });
        }

        let context = join_context(&hits);
        let answer = self.llm.generate(question, &context).await?;
        self.metrics.record_answered();
        tracing::info!(top_k, context_used = hits.len(), "Query answered");

        Ok(QueryAnswer {
            question: request.question,
            answer,
            sources: hits.iter().map(source_ref).collect(),
            context_used: hits.len(),
            outcome: QueryOutcome::Answered,
        })
    }

    /// Like [`RagPipeline::query`], but the answer is streamed as it is generated.
    pub async fn query_stream(
        &self,
        request: QueryRequest,
    ) -> Result<StreamingAnswer, PipelineError> {
        let (question, top_k) = self.validate(&request)?;
        let hits = self.retrieve(question, top_k).await?;

        if hits.is_empty() {
            self.metrics.record_no_context();
            let fixed = futures_util::stream::iter([Ok(NO_CONTEXT_ANSWER.to_string())]);
            return Ok(StreamingAnswer {
                sources: Vec::new(),
                context_used: 0,
                outcome: QueryOutcome::NoContext,
                tokens: fixed.boxed(),
            });
        }

        let context = join_context(&hits);
        let tokens = self.llm.generate_stream(question, &context).await?;
        self.metrics.record_answered();

        Ok(StreamingAnswer {
            sources: hits.iter().map(source_ref).collect(),
            context_used: hits.len(),
            outcome: QueryOutcome::Answered,
            tokens,
        })
    }

    /// Drop every stored chunk by recreating the collection.
    pub async fn reset(&self) -> Result<(), PipelineError> {
        self.store
            .reset(&self.settings.collection, self.settings.dimension as u64)
            .await?;
        tracing::warn!(collection = %self.settings.collection, "Collection reset");
        Ok(())
    }

    /// Probe the language model and the vector store concurrently.
    pub async fn health(&self) -> HealthSnapshot {
        let (llm, store) = tokio::join!(self.llm.ping(), self.store.ping());
        if let Err(error) = &llm {
            tracing::warn!(error = %error, "Ollama health probe failed");
        }
        if let Err(error) = &store {
            tracing::warn!(error = %error, "Qdrant health probe failed");
        }
        HealthSnapshot {
            ollama_connected: llm.is_ok(),
            qdrant_connected: store.is_ok(),
        }
    }

    /// Current activity counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Trimmed question and effective `top_k` for `request`.
    fn validate<'a>(&self, request: &'a QueryRequest) -> Result<(&'a str, usize), PipelineError> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "question must not be empty".into(),
            ));
        }
        let top_k = match request.top_k {
            Some(0) => {
                return Err(PipelineError::InvalidRequest(
                    "top_k must be at least 1".into(),
                ));
            }
            Some(requested) => requested.min(self.settings.max_top_k),
            None => self.settings.default_top_k,
        };
        Ok((question, top_k))
    }

    async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<ScoredPoint>, PipelineError> {
        let vector = self.embedder.generate_single(question).await?;
        self.check_dimension(&vector)?;
        let mut hits = self
            .store
            .search(
                &self.settings.collection,
                vector,
                top_k,
                self.settings.score_threshold,
            )
            .await?;
        hits.retain(|hit| hit.score >= self.settings.score_threshold);
        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits.truncate(top_k);
        tracing::debug!(top_k, hits = hits.len(), "Retrieved context");
        Ok(hits)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), PipelineError> {
        let expected = self.settings.dimension;
        if vector.len() == expected {
            Ok(())
        } else {
            Err(PipelineError::DimensionMismatch {
                expected,
                actual: vector.len(),
            })
        }
    }
}

fn join_context(hits: &[ScoredPoint]) -> String {
    hits.iter()
        .map(|hit| payload_str(&hit.payload, "text").unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn source_ref(hit: &ScoredPoint) -> SourceRef {
    SourceRef {
        source: payload_str(&hit.payload, "source").unwrap_or_else(|| "unknown".to_string()),
        score: hit.score,
        chunk_index: hit
            .payload
            .get("chunk_index")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    }
}

fn payload_str(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Operations exposed to the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Extract, chunk, embed and store an uploaded file.
    async fn ingest_upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, PipelineError>;

    /// Answer a question from stored context.
    async fn query(&self, request: QueryRequest) -> Result<QueryAnswer, PipelineError>;

    /// Answer a question, streaming the answer text.
    async fn query_stream(&self, request: QueryRequest)
    -> Result<StreamingAnswer, PipelineError>;

    /// Delete every stored chunk.
    async fn reset(&self) -> Result<(), PipelineError>;

    /// Reachability of downstream services.
    async fn health(&self) -> HealthSnapshot;

    /// Activity counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Production [`RagApi`]: a document processor feeding a [`RagPipeline`].
pub struct RagService {
    processor: DocumentProcessor,
    pipeline: RagPipeline,
}

impl RagService {
    /// Pair a processor with the pipeline it feeds.
    pub fn new(processor: DocumentProcessor, pipeline: RagPipeline) -> Self {
        Self {
            processor,
            pipeline,
        }
    }

    /// Spool `bytes` to a temporary file and extract chunks from it.
    ///
    /// The temporary file is removed when this returns, whatever the outcome.
    async fn chunk_upload(&self, source: &str, bytes: Vec<u8>) -> Result<Vec<Chunk>, PipelineError> {
        let kind = DocumentProcessor::detect_kind(Path::new(source))?;
        let processor = self.processor;
        let source = source.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<Chunk>, PipelineError> {
            let mut spooled = tempfile::Builder::new()
                .prefix("ragserve-upload-")
                .suffix(&format!(".{}", extension_for(kind)))
                .tempfile()
                .map_err(|error| io_failure(&source, error))?;
            spooled
                .write_all(&bytes)
                .and_then(|()| spooled.flush())
                .map_err(|error| io_failure(&source, error))?;
            let chunks = processor.process(spooled.path(), &source)?;
            Ok(chunks)
        })
        .await
        .map_err(|error| PipelineError::Internal(error.to_string()))?
    }
}

fn extension_for(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Pdf => "pdf",
        DocumentKind::Docx => "docx",
        DocumentKind::Text => "txt",
    }
}

fn io_failure(source: &str, error: std::io::Error) -> PipelineError {
    PipelineError::Document(DocumentError::Io {
        path: source.into(),
        source: error,
    })
}

/// Reduce a client-supplied filename to its final path component.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let candidate = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if candidate.is_empty() || candidate == "." || candidate == ".." {
        None
    } else {
        Some(candidate.to_string())
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest_upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, PipelineError> {
        let source = sanitize_filename(filename).ok_or_else(|| {
            PipelineError::InvalidRequest("uploaded file has no usable filename".into())
        })?;
        tracing::info!(source = %source, bytes = bytes.len(), "Ingesting upload");
        let chunks = self.chunk_upload(&source, bytes).await?;
        self.pipeline.ingest(&source, chunks).await
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryAnswer, PipelineError> {
        self.pipeline.query(request).await
    }

    async fn query_stream(
        &self,
        request: QueryRequest,
    ) -> Result<StreamingAnswer, PipelineError> {
        self.pipeline.query_stream(request).await
    }

    async fn reset(&self) -> Result<(), PipelineError> {
        self.pipeline.reset().await
    }

    async fn health(&self) -> HealthSnapshot {
        self.pipeline.health().await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.pipeline.metrics_snapshot()
    }
}
