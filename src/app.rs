//! Application assembly: builds every long-lived handle once and wires the HTTP stack.
//!
//! [`AppContext::initialize`] is the single construction path for the server. Handlers never
//! reach for globals; they receive the service through router state.

use crate::{
    api,
    config::Config,
    documents::{DocumentError, DocumentProcessor},
    embedding::{EmbeddingClientError, build_embedding_client},
    llm::{LanguageModelError, OllamaClient},
    pipeline::{PipelineSettings, RagPipeline, RagService},
    qdrant::{QdrantError, QdrantService, VectorStore},
};
use axum::{Router, extract::DefaultBodyLimit};
use std::sync::Arc;
use thiserror::Error;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

/// Failures that prevent the pipeline from being assembled.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Chunking configuration is unusable.
    #[error("Document processor: {0}")]
    Document(#[from] DocumentError),
    /// Embedding model could not be loaded or disagrees with configuration.
    #[error("Embedding model: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Qdrant could not be reached or the collection could not be prepared.
    #[error("Qdrant: {0}")]
    VectorStore(#[from] QdrantError),
    /// The Ollama client could not be built.
    #[error("Ollama client: {0}")]
    LanguageModel(#[from] LanguageModelError),
    /// Blocking model load panicked or was cancelled.
    #[error("Startup task failed: {0}")]
    Task(String),
}

impl StartupError {
    /// Whether the server may still start without the pipeline. Only an unreachable Qdrant
    /// qualifies; configuration and model-load failures stay fatal.
    pub fn is_degradable(&self) -> bool {
        matches!(self, Self::VectorStore(error) if error.is_unavailable())
    }
}

/// Shared handles constructed at startup.
pub struct AppContext {
    /// Configuration the context was built from.
    pub config: Config,
    /// Service backing every pipeline route.
    pub service: Arc<RagService>,
}

impl AppContext {
    /// Load the embedder, connect to Qdrant, ensure the collection and build the pipeline.
    ///
    /// The embedding model loads on the blocking pool since it may download weights.
    pub async fn initialize(config: Config) -> Result<Self, StartupError> {
        let processor = DocumentProcessor::from_config(&config)?;

        tracing::info!(
            provider = ?config.embedding_provider,
            model = %config.embedding_model,
            "Initializing embedding client"
        );
        let embed_config = config.clone();
        let embedder = tokio::task::spawn_blocking(move || build_embedding_client(&embed_config))
            .await
            .map_err(|error| StartupError::Task(error.to_string()))??;
        tracing::info!(dimension = embedder.dimension(), "Embedding client initialized");

        let store = Arc::new(QdrantService::new(&config)?);
        store
            .ensure_collection(
                &config.qdrant_collection_name,
                config.embedding_dimension as u64,
            )
            .await?;
        tracing::debug!(collection = %config.qdrant_collection_name, "Primary collection ready");

        let llm = Arc::new(OllamaClient::new(&config)?);
        let pipeline = RagPipeline::new(
            embedder,
            store,
            llm,
            PipelineSettings::from_config(&config),
        );

        Ok(Self {
            service: Arc::new(RagService::new(processor, pipeline)),
            config,
        })
    }

    /// Router serving this context.
    pub fn router(&self) -> Router {
        build_router(&self.config, Some(self.service.clone()))
    }
}

/// Wrap the API router with body limits, CORS, tracing and optional static hosting.
///
/// With `STATIC_DIR` set the API moves under `/api` and the directory is served at `/`, falling
/// back to its `index.html` for client-side routes.
pub fn build_router(config: &Config, service: Option<Arc<RagService>>) -> Router {
    let api = api::create_router(service).layer(DefaultBodyLimit::max(config.max_upload_bytes));

    let router = match &config.static_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "Serving static frontend; API mounted at /api");
            let assets = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
            Router::new().nest("/api", api).fallback_service(assets)
        }
        None => api,
    };

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use std::io::Write;
    use tower::ServiceExt;

    #[tokio::test]
    async fn unknown_embedding_model_is_fatal_even_when_not_strict() {
        let config = Config {
            embedding_model: "text-embedding-3-small".into(),
            strict_startup: false,
            ..Config::default()
        };
        let Err(error) = AppContext::initialize(config).await else {
            panic!("unknown model must fail startup");
        };
        assert!(matches!(
            error,
            StartupError::Embedding(EmbeddingClientError::UnknownModel(_))
        ));
        assert!(!error.is_degradable());
    }

    #[tokio::test]
    async fn only_unreachable_qdrant_is_degradable() {
        let config = Config {
            qdrant_url: "http://127.0.0.1:9".into(),
            embedding_provider: crate::config::EmbeddingProvider::Hash,
            ..Config::default()
        };
        let Err(error) = AppContext::initialize(config).await else {
            panic!("startup should fail without Qdrant");
        };
        assert!(error.is_degradable(), "{error}");

        let fatal = [
            StartupError::Document(DocumentError::InvalidChunking("overlap".into())),
            StartupError::Embedding(EmbeddingClientError::DimensionMismatch {
                expected: 384,
                actual: 768,
            }),
            StartupError::VectorStore(QdrantError::DimensionMismatch {
                collection: "documents".into(),
                expected: 384,
                actual: 768,
            }),
            StartupError::VectorStore(QdrantError::InvalidUrl("::".into())),
            StartupError::Task("cancelled".into()),
        ];
        for error in fatal {
            assert!(!error.is_degradable(), "{error}");
        }
    }

    #[tokio::test]
    async fn degraded_router_serves_banner_and_503s() {
        let app = build_router(&Config::default(), None);
        let response = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::delete("/reset").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn static_dir_moves_api_under_prefix() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut index = std::fs::File::create(dir.path().join("index.html")).expect("index");
        index.write_all(b"<html>frontend</html>").expect("write");

        let config = Config {
            static_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let app = build_router(&config, None);

        let response = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert!(String::from_utf8_lossy(&body).contains("frontend"));

        let response = app
            .oneshot(
                Request::get("/api/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let app = build_router(&Config::default(), None);
        let response = app
            .oneshot(
                Request::get("/")
                    .header("origin", "http://example.org")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|value| value.to_str().ok()),
            Some("*")
        );
    }
}
