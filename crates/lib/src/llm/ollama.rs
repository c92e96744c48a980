//! Ollama API client (http://localhost:11434 by default).
//! Streams completions from /api/generate (NDJSON).

use super::{CompletionBackend, LlmError, TokenStream};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
/// Longest NDJSON line accepted before the stream is failed.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Client for Ollama HTTP API.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /api/tags — list available models.
    pub async fn list_models(&self) -> Result<Vec<OllamaModel>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{} {}", status, body)));
        }
        let data: TagsResponse = res.json().await?;
        Ok(data.models.unwrap_or_default())
    }

    /// POST /api/generate with stream: true. Returns the `response` fragment of each NDJSON line as it arrives.
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<TokenStream, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt,
            stream: true,
        };
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{} {}", status, body)));
        }
        Ok(ndjson_tokens(res.bytes_stream()).boxed())
    }
}

#[async_trait]
impl CompletionBackend for OllamaClient {
    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<TokenStream, LlmError> {
        self.generate(model, prompt).await
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateStreamEvent {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Option<Vec<OllamaModel>>,
}

struct NdjsonState<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    eof: bool,
    finished: bool,
}

/// Turn a byte stream of Ollama NDJSON into a stream of text fragments.
/// Blank and unparseable lines are skipped; `done: true` ends the stream; an `error` line yields `LlmError::Api` and ends it.
/// A line longer than `MAX_LINE_BYTES` also ends it with `LlmError::Api`.
pub fn ndjson_tokens<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, LlmError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
    LlmError: From<E>,
{
    let state = NdjsonState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        eof: false,
        finished: false,
    };
    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }
            if let Some(i) = st.buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = st.buffer.drain(..=i).collect();
                let line = String::from_utf8_lossy(&line_bytes);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let event: GenerateStreamEvent = match serde_json::from_str(line) {
                    Ok(e) => e,
                    Err(_) => continue,
                };
                if let Some(msg) = event.error {
                    st.finished = true;
                    return Some((Err(LlmError::Api(msg)), st));
                }
                st.finished = event.done;
                if event.response.is_empty() {
                    continue;
                }
                return Some((Ok(event.response), st));
            }
            if st.buffer.len() > MAX_LINE_BYTES {
                st.finished = true;
                st.buffer.clear();
                return Some((
                    Err(LlmError::Api(format!(
                        "ndjson line exceeds {} bytes",
                        MAX_LINE_BYTES
                    ))),
                    st,
                ));
            }
            if st.eof {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => st.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(LlmError::from(e)), st));
                }
                None => {
                    st.eof = true;
                    if !st.buffer.is_empty() {
                        st.buffer.push(b'\n');
                    }
                }
            }
        }
    })
}
