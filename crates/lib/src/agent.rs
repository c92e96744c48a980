//! Agent turn: send one prompt to the model and fold the streamed fragments into a reply.
//! No history is kept; every inbound message is answered on its own.

use crate::llm::{CompletionBackend, LlmError};
use futures_util::StreamExt;

/// Generate a reply for `prompt`, concatenating streamed fragments in arrival order.
///
/// A blank prompt returns an empty reply without calling the backend. The reply is
/// capped at `max_chars` characters; once the cap is reached the rest of the stream
/// is dropped. Stream errors are returned to the caller.
pub async fn generate_response(
    backend: &dyn CompletionBackend,
    model: &str,
    prompt: &str,
    max_chars: usize,
) -> Result<String, LlmError> {
    if prompt.trim().is_empty() {
        return Ok(String::new());
    }

    log::debug!("agent: using model {}", model);
    let mut stream = backend.generate_stream(model, prompt).await?;
    let mut reply = String::new();
    let mut used = 0usize;
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        let remaining = max_chars - used;
        let len = fragment.chars().count();
        if len <= remaining {
            reply.push_str(&fragment);
            used += len;
            if used < max_chars {
                continue;
            }
        } else {
            reply.extend(fragment.chars().take(remaining));
        }
        log::warn!(
            "agent: reply reached {} characters, dropping the rest of the stream",
            max_chars
        );
        break;
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TokenStream;
    use async_trait::async_trait;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Backend that replays fixed fragments and records the prompts it was given.
    struct ScriptedBackend {
        fragments: Vec<Result<&'static str, &'static str>>,
        calls: AtomicUsize,
        last: Mutex<Option<(String, String)>>,
    }

    impl ScriptedBackend {
        fn new(fragments: Vec<Result<&'static str, &'static str>>) -> Self {
            Self {
                fragments,
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn generate_stream(&self, model: &str, prompt: &str) -> Result<TokenStream, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some((model.to_string(), prompt.to_string()));
            let items: Vec<Result<String, LlmError>> = self
                .fragments
                .iter()
                .map(|f| match f {
                    Ok(s) => Ok(s.to_string()),
                    Err(e) => Err(LlmError::Api(e.to_string())),
                })
                .collect();
            Ok(stream::iter(items).boxed())
        }
    }

    struct UnreachableBackend;

    #[async_trait]
    impl CompletionBackend for UnreachableBackend {
        async fn generate_stream(&self, _model: &str, _prompt: &str) -> Result<TokenStream, LlmError> {
            Err(LlmError::Api("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn blank_prompt_skips_backend() {
        let backend = ScriptedBackend::new(vec![Ok("never")]);
        assert_eq!(generate_response(&backend, "llama3", "", 4096).await.unwrap(), "");
        assert_eq!(generate_response(&backend, "llama3", " \n\t", 4096).await.unwrap(), "");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concatenates_fragments_in_order() {
        let backend = ScriptedBackend::new(vec![Ok("Hel"), Ok("lo!")]);
        let reply = generate_response(&backend, "llama3", "hi", 4096).await.unwrap();
        assert_eq!(reply, "Hello!");
        assert_eq!(
            backend.last.lock().unwrap().clone(),
            Some(("llama3".to_string(), "hi".to_string()))
        );
    }

    #[tokio::test]
    async fn empty_stream_gives_empty_reply() {
        let backend = ScriptedBackend::new(vec![]);
        assert_eq!(generate_response(&backend, "m", "hi", 4096).await.unwrap(), "");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stream_error_propagates() {
        let backend = ScriptedBackend::new(vec![Ok("partial"), Err("stream broke")]);
        let err = generate_response(&backend, "m", "hi", 4096).await.unwrap_err();
        assert!(matches!(err, LlmError::Api(ref m) if m == "stream broke"));
    }

    #[tokio::test]
    async fn open_error_propagates() {
        let err = generate_response(&UnreachableBackend, "m", "hi", 4096)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn reply_is_capped_on_char_boundary() {
        let backend = ScriptedBackend::new(vec![Ok("ab"), Ok("çdé"), Ok("never")]);
        let reply = generate_response(&backend, "m", "hi", 4).await.unwrap();
        assert_eq!(reply, "abçd");
    }

    #[tokio::test]
    async fn cap_hit_exactly_stops_reading() {
        let backend = ScriptedBackend::new(vec![Ok("abc"), Ok("d"), Err("not reached")]);
        let reply = generate_response(&backend, "m", "hi", 4).await.unwrap();
        assert_eq!(reply, "abcd");
    }
}
