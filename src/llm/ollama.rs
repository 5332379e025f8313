//! Ollama-backed generation client talking to `/api/generate` over HTTP.

use super::{LanguageModel, LanguageModelError, TokenStream, render_prompt};
use crate::config::Config;
use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Generation client for a locally hosted Ollama runtime.
pub struct OllamaClient {
    http: Client,
    stream_http: Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    ping_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaClient {
    /// Build a client for the endpoint and model named in `config`.
    ///
    /// Non-streaming generations are bounded by `LLM_TIMEOUT_SECS`; streaming generations only
    /// bound the connection attempt so long answers are not cut off mid-stream.
    pub fn new(config: &Config) -> Result<Self, LanguageModelError> {
        let timeout = Duration::from_secs(config.llm_timeout_secs);
        let user_agent = concat!("ragserve/", env!("CARGO_PKG_VERSION"));
        let http = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|error| LanguageModelError::Config(error.to_string()))?;
        let stream_http = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|error| LanguageModelError::Config(error.to_string()))?;

        tracing::debug!(
            url = %config.ollama_base_url,
            model = %config.ollama_model,
            timeout_secs = config.llm_timeout_secs,
            "Initialized Ollama client"
        );

        Ok(Self {
            http,
            stream_http,
            base_url: config.ollama_base_url.trim_end_matches('/').to_string(),
            model: config.ollama_model.clone(),
            temperature: config.llm_temperature,
            timeout,
            ping_timeout: CONNECT_TIMEOUT,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn payload(&self, question: &str, context: &str, stream: bool) -> serde_json::Value {
        json!({
            "model": self.model,
            "prompt": render_prompt(question, context),
            "stream": stream,
            "options": {
                "temperature": self.temperature,
            }
        })
    }

    fn transport_error(&self, error: reqwest::Error) -> LanguageModelError {
        if error.is_timeout() {
            LanguageModelError::Transient(format!(
                "Ollama did not answer within {}s",
                self.timeout.as_secs()
            ))
        } else if error.is_connect() {
            LanguageModelError::Transient(format!(
                "failed to reach Ollama at {}: {error}",
                self.base_url
            ))
        } else {
            LanguageModelError::Transient(error.to_string())
        }
    }

    async fn status_error(&self, response: reqwest::Response) -> LanguageModelError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_status(status, &body, &self.model)
    }
}

fn classify_status(status: StatusCode, body: &str, model: &str) -> LanguageModelError {
    if status == StatusCode::NOT_FOUND {
        LanguageModelError::Config(format!("model '{model}' is not available in Ollama: {body}"))
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        LanguageModelError::Transient(format!("Ollama returned {status}: {body}"))
    } else {
        LanguageModelError::Config(format!("Ollama rejected the request ({status}): {body}"))
    }
}

/// Parse one NDJSON line of a streaming generation into an answer fragment.
fn parse_stream_line(line: &[u8]) -> Result<Option<String>, LanguageModelError> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let chunk: StreamChunk = serde_json::from_str(line).map_err(|error| {
        LanguageModelError::InvalidResponse(format!("undecodable stream line: {error}"))
    })?;
    if let Some(message) = chunk.error {
        return Err(LanguageModelError::Transient(message));
    }
    Ok(Some(chunk.response).filter(|fragment| !fragment.is_empty()))
}

fn ndjson_fragments<S, B>(bytes: S) -> impl Stream<Item = Result<String, LanguageModelError>>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer: Vec<u8> = Vec::new();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|error| {
                LanguageModelError::Transient(format!("generation stream interrupted: {error}"))
            })?;
            buffer.extend_from_slice(chunk.as_ref());
            while let Some(position) = buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = buffer.drain(..=position).collect();
                if let Some(fragment) = parse_stream_line(&line)? {
                    yield fragment;
                }
            }
        }
        if let Some(fragment) = parse_stream_line(&buffer)? {
            yield fragment;
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&self, question: &str, context: &str) -> Result<String, LanguageModelError> {
        tracing::debug!(model = %self.model, context_chars = context.len(), "Requesting generation");
        let response = self
            .http
            .post(self.endpoint("api/generate"))
            .json(&self.payload(question, context, false))
            .send()
            .await
            .map_err(|error| self.transport_error(error))?;

        if !response.status().is_success() {
            let error = self.status_error(response).await;
            tracing::warn!(error = %error, "Ollama generation failed");
            return Err(error);
        }

        let body: GenerateResponse = response.json().await.map_err(|error| {
            if error.is_timeout() {
                self.transport_error(error)
            } else {
                LanguageModelError::InvalidResponse(format!(
                    "failed to decode Ollama response: {error}"
                ))
            }
        })?;

        if !body.done {
            return Err(LanguageModelError::InvalidResponse(
                "Ollama response incomplete".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }

    async fn generate_stream(
        &self,
        question: &str,
        context: &str,
    ) -> Result<TokenStream, LanguageModelError> {
        let response = self
            .stream_http
            .post(self.endpoint("api/generate"))
            .json(&self.payload(question, context, true))
            .send()
            .await
            .map_err(|error| self.transport_error(error))?;

        if !response.status().is_success() {
            let error = self.status_error(response).await;
            tracing::warn!(error = %error, "Ollama streaming generation failed");
            return Err(error);
        }

        Ok(Box::pin(ndjson_fragments(response.bytes_stream())))
    }

    async fn ping(&self) -> Result<(), LanguageModelError> {
        let response = self
            .http
            .get(self.endpoint("api/tags"))
            .timeout(self.ping_timeout)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    LanguageModelError::Transient(format!(
                        "Ollama health check timed out after {}s",
                        self.ping_timeout.as_secs_f32()
                    ))
                } else {
                    self.transport_error(error)
                }
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.status_error(response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };

    fn client_for(server: &MockServer, timeout_secs: u64) -> OllamaClient {
        let config = Config {
            ollama_base_url: server.base_url(),
            ollama_model: "llama3.1".into(),
            llm_timeout_secs: timeout_secs,
            ..Config::default()
        };
        OllamaClient::new(&config).expect("client")
    }

    #[tokio::test]
    async fn generate_returns_trimmed_answer() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{ "model": "llama3.1", "stream": false }"#)
                    .body_contains("Paris is the capital of France.");
                then.status(200).json_body(json!({
                    "model": "llama3.1",
                    "response": "  The capital of France is Paris.\n",
                    "done": true
                }));
            })
            .await;

        let answer = client_for(&server, 60)
            .generate("What is the capital of France?", "Paris is the capital of France.")
            .await
            .expect("answer");

        mock.assert();
        assert_eq!(answer, "The capital of France is Paris.");
    }

    #[tokio::test]
    async fn missing_model_is_a_configuration_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(404)
                    .json_body(json!({ "error": "model \"llama3.1\" not found" }));
            })
            .await;

        let error = client_for(&server, 60)
            .generate("q", "c")
            .await
            .unwrap_err();
        assert!(matches!(error, LanguageModelError::Config(message) if message.contains("llama3.1")));
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = client_for(&server, 60)
            .generate("q", "c")
            .await
            .unwrap_err();
        assert!(matches!(error, LanguageModelError::Transient(message) if message.contains("500")));
    }

    #[tokio::test]
    async fn slow_generation_times_out_as_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200)
                    .delay(Duration::from_secs(3))
                    .json_body(json!({ "response": "late", "done": true }));
            })
            .await;

        let error = client_for(&server, 1)
            .generate("q", "c")
            .await
            .unwrap_err();
        assert!(matches!(error, LanguageModelError::Transient(_)), "{error:?}");
    }

    #[tokio::test]
    async fn stream_yields_fragments_in_order() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{ "stream": true }"#);
                then.status(200).body(concat!(
                    "{\"response\":\"Paris\",\"done\":false}\n",
                    "{\"response\":\" is\",\"done\":false}\n",
                    "{\"response\":\" the capital.\",\"done\":false}\n",
                    "{\"response\":\"\",\"done\":true}\n"
                ));
            })
            .await;

        let stream = client_for(&server, 60)
            .generate_stream("q", "c")
            .await
            .expect("stream");
        let fragments: Vec<String> = stream
            .map(|item| item.expect("fragment"))
            .collect()
            .await;
        assert_eq!(fragments, vec!["Paris", " is", " the capital."]);
    }

    #[test]
    fn stream_error_lines_surface_as_errors() {
        let error = parse_stream_line(br#"{"error":"model crashed"}"#).unwrap_err();
        assert!(matches!(error, LanguageModelError::Transient(message) if message == "model crashed"));
        assert!(parse_stream_line(b"   \n").expect("blank").is_none());
        assert!(matches!(
            parse_stream_line(b"not json").unwrap_err(),
            LanguageModelError::InvalidResponse(_)
        ));
    }

    #[tokio::test]
    async fn ping_uses_tags_endpoint() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tags");
                then.status(200).json_body(json!({ "models": [] }));
            })
            .await;

        client_for(&server, 60).ping().await.expect("reachable");
        mock.assert();
    }

    #[tokio::test]
    async fn stalled_ping_gives_up_before_generation_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tags");
                then.status(200)
                    .json_body(json!({ "models": [] }))
                    .delay(Duration::from_secs(3));
            })
            .await;

        let mut client = client_for(&server, 60);
        client.ping_timeout = Duration::from_millis(200);
        let started = std::time::Instant::now();
        let error = client.ping().await.unwrap_err();

        assert!(matches!(error, LanguageModelError::Transient(_)), "{error:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn ping_timeout_defaults_to_connect_timeout() {
        let client = OllamaClient::new(&Config::default()).expect("client");
        assert_eq!(client.ping_timeout, CONNECT_TIMEOUT);
        assert!(client.ping_timeout < client.timeout);
    }
}
