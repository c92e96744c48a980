//! LLM abstraction and Ollama client.
//!
//! The gateway only needs one capability from the model side: open a stream of
//! completion fragments for a prompt. `CompletionBackend` is that seam.

mod ollama;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub use ollama::{ndjson_tokens, OllamaClient, OllamaModel};

/// Lazy sequence of completion fragments, in generation order.
pub type TokenStream = BoxStream<'static, Result<String, LlmError>>;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("llm api error: {0}")]
    Api(String),
}

/// Inference capability: stream completion tokens for a prompt.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<TokenStream, LlmError>;
}
