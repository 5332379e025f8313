//! Shared types used by the Qdrant client and the vector store contract.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The collection does not exist.
    #[error("Collection '{0}' does not exist")]
    CollectionNotFound(String),
    /// An existing collection stores vectors of a different size.
    #[error("Collection '{collection}' stores {actual}-dimensional vectors, expected {expected}")]
    DimensionMismatch {
        /// Collection that failed the check.
        collection: String,
        /// Dimension the embedder produces.
        expected: u64,
        /// Dimension configured on the collection.
        actual: u64,
    },
    /// Response body did not have the expected shape.
    #[error("Malformed Qdrant response: {0}")]
    InvalidResponse(String),
}

impl QdrantError {
    /// Whether the failure means Qdrant could not be reached or could not serve the request
    /// right now, as opposed to rejecting it.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Http(error) => error.is_connect() || error.is_timeout(),
            Self::UnexpectedStatus { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

/// Prepared record ready for upsert: chunk text, its vector and caller metadata.
#[derive(Debug, Clone)]
pub struct PointInsert {
    /// Raw chunk text.
    pub text: String,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
    /// Metadata merged into the stored payload.
    pub metadata: Map<String, Value>,
}

/// Scored payload returned by Qdrant queries.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Identifier assigned to the vector.
    pub id: String,
    /// Similarity score computed by Qdrant.
    pub score: f32,
    /// Payload associated with the vector.
    pub payload: Map<String, Value>,
}

/// Summary describing how Qdrant applied an upsert.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexSummary {
    /// Number of points written by the request.
    pub inserted: usize,
}

#[derive(Deserialize)]
pub(crate) struct ListCollectionsResponse {
    pub(crate) result: ListCollectionsResult,
}

#[derive(Deserialize)]
pub(crate) struct ListCollectionsResult {
    pub(crate) collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
pub(crate) struct CollectionDescription {
    pub(crate) name: String,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfoResponse {
    pub(crate) result: CollectionInfo,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfo {
    pub(crate) config: CollectionConfig,
}

#[derive(Deserialize)]
pub(crate) struct CollectionConfig {
    pub(crate) params: CollectionParams,
}

#[derive(Deserialize)]
pub(crate) struct CollectionParams {
    pub(crate) vectors: VectorsConfig,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum VectorsConfig {
    Single(VectorParams),
    Named(HashMap<String, VectorParams>),
}

#[derive(Deserialize)]
pub(crate) struct VectorParams {
    pub(crate) size: u64,
}

impl VectorsConfig {
    /// Size of the collection's default (unnamed) or only vector.
    pub(crate) fn size(&self) -> Option<u64> {
        match self {
            Self::Single(params) => Some(params.size),
            Self::Named(named) => match named.len() {
                1 => named.values().next().map(|params| params.size),
                _ => named.get("").map(|params| params.size),
            },
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
