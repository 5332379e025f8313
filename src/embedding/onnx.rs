//! fastembed-backed embedding client running ONNX sentence-transformer models locally.

use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};

/// Known model identifiers, keyed by their normalized short name.
const MODELS: &[(&str, EmbeddingModel)] = &[
    ("all-minilm-l6-v2", EmbeddingModel::AllMiniLML6V2),
    ("all-minilm-l12-v2", EmbeddingModel::AllMiniLML12V2),
    ("bge-small-en-v1.5", EmbeddingModel::BGESmallENV15),
    ("bge-base-en-v1.5", EmbeddingModel::BGEBaseENV15),
    ("bge-large-en-v1.5", EmbeddingModel::BGELargeENV15),
    ("nomic-embed-text-v1.5", EmbeddingModel::NomicEmbedTextV15),
    ("multilingual-e5-small", EmbeddingModel::MultilingualE5Small),
    (
        "paraphrase-multilingual-minilm-l12-v2",
        EmbeddingModel::ParaphraseMLMiniLML12V2,
    ),
];

/// Map a model identifier such as `sentence-transformers/all-MiniLM-L6-v2` or
/// `Qdrant/all-MiniLM-L6-v2-onnx` to a fastembed model.
pub fn resolve_model(identifier: &str) -> Option<EmbeddingModel> {
    let short = identifier
        .trim()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    let short = short.trim_end_matches("-onnx");
    MODELS
        .iter()
        .find(|(name, _)| *name == short)
        .map(|(_, model)| model.clone())
}

/// Embedding client holding a single fastembed session.
///
/// The session needs exclusive access while encoding, so it lives behind a mutex and every
/// call runs on the blocking thread pool.
pub struct FastEmbedClient {
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
    model_name: String,
}

impl FastEmbedClient {
    /// Download (if needed) and initialize the model named by `identifier`.
    pub fn load(identifier: &str) -> Result<Self, EmbeddingClientError> {
        let model = resolve_model(identifier)
            .ok_or_else(|| EmbeddingClientError::UnknownModel(identifier.to_string()))?;

        tracing::info!(model = identifier, "Loading embedding model");
        let mut text_model =
            TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(false))
                .map_err(|error| EmbeddingClientError::ModelLoad(error.to_string()))?;

        let probe = text_model
            .embed(vec!["dimension probe"], None)
            .map_err(|error| EmbeddingClientError::ModelLoad(error.to_string()))?;
        let dimension = probe
            .into_iter()
            .next()
            .map(|vector| vector.len())
            .ok_or_else(|| {
                EmbeddingClientError::ModelLoad("model returned no probe embedding".into())
            })?;
        tracing::info!(model = identifier, dimension, "Embedding model ready");

        Ok(Self {
            model: Arc::new(Mutex::new(text_model)),
            dimension,
            model_name: identifier.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for FastEmbedClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            model = %self.model_name,
            count = texts.len(),
            "Generating embeddings"
        );
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut guard = model.lock().map_err(|_| {
                EmbeddingClientError::GenerationFailed("embedding model lock poisoned".into())
            })?;
            guard
                .embed(texts, None)
                .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))
        })
        .await
        .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))?
    }
}
