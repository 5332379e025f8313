//! Qdrant vector store integration.

pub mod client;
pub mod payload;
pub mod types;

pub use client::QdrantService;
pub use types::{IndexSummary, PointInsert, QdrantError, ScoredPoint};

use async_trait::async_trait;

/// Storage contract the pipeline relies on. [`QdrantService`] is the production implementation.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create `name` with cosine distance if absent. An existing collection whose vector size
    /// differs from `dimension` is rejected.
    async fn ensure_collection(&self, name: &str, dimension: u64) -> Result<(), QdrantError>;

    /// Upsert records under fresh identifiers.
    async fn add(&self, name: &str, records: Vec<PointInsert>) -> Result<IndexSummary, QdrantError>;

    /// Nearest neighbours scoring at least `score_threshold`, best first. `Ok(vec![])` means
    /// no match; failures to reach the store are errors.
    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, QdrantError>;

    /// Destroy and recreate the collection. Irreversible.
    async fn reset(&self, name: &str, dimension: u64) -> Result<(), QdrantError>;

    /// Cheap reachability probe.
    async fn ping(&self) -> Result<(), QdrantError>;
}
