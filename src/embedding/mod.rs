//! Embedding client abstraction and adapters.

mod onnx;

pub use onnx::{FastEmbedClient, resolve_model};

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// The configured model identifier does not name a supported model.
    #[error("Unknown embedding model: {0}")]
    UnknownModel(String),
    /// The model could not be downloaded or initialized.
    #[error("Failed to load embedding model: {0}")]
    ModelLoad(String),
    /// Loaded model produces vectors of a different size than configured.
    #[error("Embedding model produces {actual}-dimensional vectors but {expected} are configured")]
    DimensionMismatch {
        /// Dimension from configuration.
        expected: usize,
        /// Dimension reported by the model.
        actual: usize,
    },
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Fixed length of every vector this client produces.
    fn dimension(&self) -> usize;

    /// Produce one embedding per input text, preserving order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Produce the embedding of a single text.
    async fn generate_single(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        let mut vectors = self.generate_embeddings(vec![text.to_string()]).await?;
        match (vectors.pop(), vectors.is_empty()) {
            (Some(vector), true) => Ok(vector),
            _ => Err(EmbeddingClientError::GenerationFailed(
                "expected exactly one vector for a single input".to_string(),
            )),
        }
    }
}

/// Deterministic embedding client that hashes bytes into a normalized vector.
///
/// Useful offline and in tests: identical texts map to identical vectors and texts sharing
/// most of their bytes land close together under cosine similarity.
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    /// Construct a client emitting vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

/// Build the embedding client selected by configuration.
///
/// Loading a fastembed model may download weights and is blocking; call this from
/// `spawn_blocking` when on an async runtime. Failures are meant to abort startup.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    match config.embedding_provider {
        EmbeddingProvider::Hash => {
            tracing::info!(
                dimension = config.embedding_dimension,
                "Using deterministic hash embeddings"
            );
            Ok(Arc::new(HashEmbeddingClient::new(config.embedding_dimension)))
        }
        EmbeddingProvider::FastEmbed => {
            let client = FastEmbedClient::load(&config.embedding_model)?;
            if client.dimension() != config.embedding_dimension {
                return Err(EmbeddingClientError::DimensionMismatch {
                    expected: config.embedding_dimension,
                    actual: client.dimension(),
                });
            }
            Ok(Arc::new(client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_vectors_match_configured_dimension() {
        let client = HashEmbeddingClient::new(384);
        let long = "x".repeat(2000);
        for text in ["", "a", "The capital of France is Paris.", long.as_str()] {
            let vector = client.generate_single(text).await.expect("vector");
            assert_eq!(vector.len(), 384);
        }
    }

    #[tokio::test]
    async fn hash_embeddings_preserve_order_and_determinism() {
        let client = HashEmbeddingClient::new(16);
        let texts = vec!["alpha".to_string(), "beta".to_string(), "alpha".to_string()];
        let vectors = client.generate_embeddings(texts).await.expect("vectors");
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[2]);
        assert_ne!(vectors[0], vectors[1]);

        let norm: f32 = vectors[1].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn zero_dimension_is_rejected() {
        let client = HashEmbeddingClient::new(0);
        let error = client.generate_single("text").await.unwrap_err();
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(_)));
    }

    #[test]
    fn hash_provider_builds_without_model_download() {
        let config = Config {
            embedding_provider: EmbeddingProvider::Hash,
            embedding_dimension: 32,
            ..Config::default()
        };
        let client = build_embedding_client(&config).expect("client");
        assert_eq!(client.dimension(), 32);
    }
}
