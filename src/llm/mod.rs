//! Language-model abstraction used to turn retrieved context into an answer.
//!
//! Generation failures are typed rather than folded into the answer text: callers can tell a
//! transient outage (timeout, connection refused, 5xx) from a misconfiguration (unknown model)
//! and from a response they could not decode.

mod ollama;

pub use ollama::OllamaClient;

use async_trait::async_trait;
use futures_core::stream::BoxStream;
use thiserror::Error;

/// Stream of answer fragments in generation order.
pub type TokenStream = BoxStream<'static, Result<String, LanguageModelError>>;

/// Errors surfaced by language-model providers.
#[derive(Debug, Error)]
pub enum LanguageModelError {
    /// Provider timed out, was unreachable, or failed server-side. Retrying later may succeed.
    #[error("Language model temporarily unavailable: {0}")]
    Transient(String),
    /// Provider rejected the request in a way retries will not fix (e.g. unknown model).
    #[error("Language model misconfigured: {0}")]
    Config(String),
    /// Provider answered with a body that could not be interpreted.
    #[error("Malformed language model response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by generation backends.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Answer `question` using only `context`.
    async fn generate(&self, question: &str, context: &str) -> Result<String, LanguageModelError>;

    /// Streaming variant of [`LanguageModel::generate`].
    async fn generate_stream(
        &self,
        question: &str,
        context: &str,
    ) -> Result<TokenStream, LanguageModelError>;

    /// Cheap reachability probe.
    async fn ping(&self) -> Result<(), LanguageModelError>;
}

/// Sentence the model is told to use when the context does not contain the answer.
pub const INSUFFICIENT_CONTEXT_REPLY: &str = "I don't have enough information to answer that";

/// Render the retrieval-augmented prompt sent to the model.
pub fn render_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a helpful AI assistant. Use the following context to answer the question \
accurately and concisely.

Context:
{context}

Question: {question}

Instructions:
- Answer based ONLY on the provided context
- If the answer is not in the context, say \"{INSUFFICIENT_CONTEXT_REPLY}\"
- Keep your answer clear and concise (max 3-5 sentences)
- Cite specific parts of the context when relevant

Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_context_before_question() {
        let prompt = render_prompt("What is the capital?", "Paris is the capital of France.");
        let context_at = prompt.find("Paris is the capital of France.").expect("context");
        let question_at = prompt.find("Question: What is the capital?").expect("question");
        assert!(context_at < question_at);
        assert!(prompt.trim_end().ends_with("Answer:"));
    }

    #[test]
    fn prompt_restricts_model_to_context() {
        let prompt = render_prompt("q", "c");
        assert!(prompt.contains("ONLY on the provided context"));
        assert!(prompt.contains(INSUFFICIENT_CONTEXT_REPLY));
        assert!(prompt.contains("3-5 sentences"));
    }
}
