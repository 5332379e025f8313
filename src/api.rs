//! HTTP surface for the question-answering service.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /` – Service banner.
//! - `GET /health` – Reachability of Ollama and Qdrant (`healthy` or `degraded`).
//! - `POST /ingest/file` – Multipart upload (field `file`) of a PDF, DOCX or TXT document.
//! - `POST /query` – Answer a question from stored context.
//! - `POST /query/stream` – Same as `/query`, delivered as server-sent events.
//! - `DELETE /reset` – Drop every stored chunk.
//! - `GET /metrics` – Ingestion and query counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! When the pipeline failed to initialize the router still serves, but every pipeline-backed
//! route answers `503`. Errors use the JSON body `{ "detail": ..., "kind": ... }`.

use crate::{
    documents::DocumentError,
    llm::LanguageModelError,
    pipeline::{PipelineError, QueryRequest, RagApi},
    qdrant::QdrantError,
};
use async_stream::stream;
use axum::{
    Json, Router,
    extract::{Multipart, State, multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{delete, get, post},
};
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::json;
use std::{convert::Infallible, sync::Arc};

/// Router state: the service, or `None` when startup left the pipeline uninitialized.
struct ApiState<S> {
    service: Option<Arc<S>>,
}

impl<S> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

impl<S> ApiState<S> {
    fn service(&self) -> Result<&Arc<S>, AppError> {
        self.service.as_ref().ok_or_else(AppError::not_initialized)
    }
}

/// Build the HTTP router. Pass `None` to serve in degraded mode.
pub fn create_router<S>(service: Option<Arc<S>>) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route("/", get(root))
        .route("/health", get(health::<S>))
        .route("/ingest/file", post(ingest_file::<S>))
        .route("/query", post(query::<S>))
        .route("/query/stream", post(query_stream::<S>))
        .route("/reset", delete(reset::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(ApiState { service })
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "ragserve question answering API",
        "status": "running",
        "docs": "/commands",
    }))
}

/// Response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    ollama_connected: bool,
    qdrant_connected: bool,
}

async fn health<S>(State(state): State<ApiState<S>>) -> Json<HealthResponse>
where
    S: RagApi,
{
    let Some(service) = state.service.as_ref() else {
        return Json(HealthResponse {
            status: "degraded",
            ollama_connected: false,
            qdrant_connected: false,
        });
    };
    let snapshot = service.health().await;
    Json(HealthResponse {
        status: snapshot.status(),
        ollama_connected: snapshot.ollama_connected,
        qdrant_connected: snapshot.qdrant_connected,
    })
}

/// Ingest the multipart field named `file`.
///
/// Other fields are ignored. The upload is spooled to a temporary file that is removed once the
/// request finishes, successful or not.
async fn ingest_file<S>(
    State(state): State<ApiState<S>>,
    mut multipart: Multipart,
) -> Result<Response, AppError>
where
    S: RagApi,
{
    let service = state.service()?;
    while let Some(field) = multipart.next_field().await.map_err(AppError::multipart)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(AppError::multipart)?;
        let outcome = service.ingest_upload(&filename, bytes.to_vec()).await?;
        tracing::info!(
            filename = %filename,
            chunks = outcome.documents_ingested,
            "Ingest request completed"
        );
        return Ok(Json(outcome).into_response());
    }
    Err(AppError::bad_request("multipart field 'file' is required"))
}

async fn query<S>(
    State(state): State<ApiState<S>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Response, AppError>
where
    S: RagApi,
{
    let service = state.service()?;
    let Json(request) = payload.map_err(AppError::json)?;
    let answer = service.query(request).await?;
    Ok(Json(answer).into_response())
}

/// Stream an answer as server-sent events.
///
/// Emits one `sources` event (`{sources, context_used, outcome}`), then a `token` event per
/// answer fragment (`{text}`), then `done`. A generation failure after the stream has started
/// is reported as an `error` event carrying the usual error body.
async fn query_stream<S>(
    State(state): State<ApiState<S>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError>
where
    S: RagApi + 'static,
{
    let service = state.service()?;
    let Json(request) = payload.map_err(AppError::json)?;
    let answer = service.query_stream(request).await?;

    let events = stream! {
        let header = json!({
            "sources": answer.sources,
            "context_used": answer.context_used,
            "outcome": answer.outcome,
        });
        yield Ok(Event::default().event("sources").data(header.to_string()));

        let mut tokens = answer.tokens;
        while let Some(item) = tokens.next().await {
            match item {
                Ok(fragment) => {
                    let body = json!({ "text": fragment });
                    yield Ok(Event::default().event("token").data(body.to_string()));
                }
                Err(error) => {
                    let error = AppError::from(PipelineError::from(error));
                    tracing::warn!(detail = %error.detail, "Streaming generation failed");
                    yield Ok(Event::default().event("error").data(error.body().to_string()));
                    break;
                }
            }
        }
        yield Ok(Event::default().event("done").data("{}"));
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn reset<S>(State(state): State<ApiState<S>>) -> Result<Response, AppError>
where
    S: RagApi,
{
    state.service()?.reset().await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Collection reset successfully",
    }))
    .into_response())
}

/// Return the ingestion and query counters.
async fn get_metrics<S>(State(state): State<ApiState<S>>) -> Result<Response, AppError>
where
    S: RagApi,
{
    let snapshot = state.service()?.metrics_snapshot();
    Ok(Json(snapshot).into_response())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Report whether Ollama and Qdrant are reachable.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ingest_file",
                method: "POST",
                path: "/ingest/file",
                description: "Upload a PDF, DOCX or TXT file as multipart field 'file'; it is chunked, embedded and stored. Response returns { \"status\": \"success\", \"documents_ingested\": number }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "query",
                method: "POST",
                path: "/query",
                description: "Answer a question from stored context. Response returns the answer, its sources and the outcome (answered | no_context).",
                request_example: Some(json!({
                    "question": "What is the capital of France?",
                    "top_k": 5
                })),
            },
            CommandDescriptor {
                name: "query_stream",
                method: "POST",
                path: "/query/stream",
                description: "Like query, streamed as server-sent events: sources, token..., done.",
                request_example: Some(json!({
                    "question": "What is the capital of France?"
                })),
            },
            CommandDescriptor {
                name: "reset",
                method: "DELETE",
                path: "/reset",
                description: "Delete every stored chunk by recreating the collection. Irreversible.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and query counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

/// Error rendered as `{ "detail", "kind" }` with a status matching its cause.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    kind: &'static str,
    detail: String,
}

impl AppError {
    fn not_initialized() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            kind: "not_initialized",
            detail: "RAG system not initialized".into(),
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "invalid_request",
            detail: detail.into(),
        }
    }

    fn multipart(error: MultipartError) -> Self {
        let status = error.status();
        Self {
            status: if status.is_client_error() {
                status
            } else {
                StatusCode::BAD_REQUEST
            },
            kind: "invalid_request",
            detail: error.body_text(),
        }
    }

    fn json(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }

    fn body(&self) -> serde_json::Value {
        json!({ "detail": self.detail, "kind": self.kind })
    }
}

fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        PipelineError::EmptyDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Document(DocumentError::UnsupportedFileType(_)) => {
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        }
        PipelineError::Store(error) if error.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Store(QdrantError::InvalidResponse(_)) => StatusCode::BAD_GATEWAY,
        PipelineError::Store(QdrantError::Http(error)) if error.is_decode() => {
            StatusCode::BAD_GATEWAY
        }
        PipelineError::LanguageModel(LanguageModelError::Transient(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        PipelineError::LanguageModel(LanguageModelError::InvalidResponse(_)) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        let status = status_for(&inner);
        if status.is_server_error() {
            tracing::error!(error = %inner, kind = inner.kind(), "Request failed");
        } else {
            tracing::debug!(error = %inner, kind = inner.kind(), "Request rejected");
        }
        Self {
            status,
            kind: inner.kind(),
            detail: inner.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body())).into_response()
    }
}
