//! Gateway HTTP server: WhatsApp webhook (handshake + events) and health probe.

use crate::agent;
use crate::channels::{extract_message, ReplySender, SendError, TextReply, WhatsAppChannel};
use crate::config::{self, Config};
use crate::llm::{CompletionBackend, LlmError, OllamaClient};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const SUBSCRIBE_MODE: &str = "subscribe";
const VERIFY_REJECTED: &str = "Invalid verification token";

/// Shared state for the gateway. Everything here is read-only after startup.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Secret the platform must present during the handshake. None rejects every handshake.
    pub verify_token: Option<Arc<str>>,
    pub model: Arc<str>,
    pub max_reply_chars: usize,
    pub backend: Arc<dyn CompletionBackend>,
    pub replies: Arc<dyn ReplySender>,
}

impl GatewayState {
    /// Resolve token, model and reply cap from config and wire in the two capabilities.
    /// Environment overrides are applied when the config is loaded, not here.
    pub fn new(
        config: Config,
        backend: Arc<dyn CompletionBackend>,
        replies: Arc<dyn ReplySender>,
    ) -> Self {
        Self {
            verify_token: config::resolve_verify_token(&config).map(Arc::from),
            model: Arc::from(config::resolve_model(&config)),
            max_reply_chars: config::resolve_max_reply_chars(&config),
            config: Arc::new(config),
            backend,
            replies,
        }
    }
}

/// Query string of the webhook handshake (`hub.mode`, `hub.challenge`, `hub.verify_token`).
#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
}

/// Check a handshake against the configured token. Returns the challenge to echo on success.
/// Comparison is exact; the challenge must be an integer and is returned as sent.
pub fn verify_handshake<'a>(query: &'a VerifyQuery, expected: Option<&str>) -> Option<&'a str> {
    let expected = expected?;
    if query.mode.as_deref() != Some(SUBSCRIBE_MODE) {
        return None;
    }
    if query.verify_token.as_deref() != Some(expected) {
        return None;
    }
    let challenge = query.challenge.as_deref()?;
    challenge.parse::<i64>().ok()?;
    Some(challenge)
}

/// What happened to one webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Body was not JSON.
    Malformed,
    /// JSON without a text message (status callback, receipt, media, ...).
    Ignored,
    /// A reply was generated and accepted by the send API.
    Replied { recipient: String, chars: usize },
}

/// Failure while answering an event. Never reaches the HTTP response.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("completion failed: {0}")]
    Completion(#[from] LlmError),
    #[error("reply dispatch failed: {0}")]
    Send(#[from] SendError),
}

/// Parse, extract, generate, reply. Errors propagate to the POST handler.
pub async fn process_event(state: &GatewayState, body: &[u8]) -> Result<EventOutcome, ProcessError> {
    let payload: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("webhook: body is not JSON: {}", e);
            return Ok(EventOutcome::Malformed);
        }
    };
    let Some(msg) = extract_message(&payload) else {
        return Ok(EventOutcome::Ignored);
    };
    log::debug!("webhook: message from {}", msg.sender);

    let completion = agent::generate_response(
        state.backend.as_ref(),
        &state.model,
        &msg.text,
        state.max_reply_chars,
    )
    .await?;

    let reply = TextReply::new(msg.sender, completion);
    log::debug!("webhook: sending reply via {}", state.replies.id());
    state.replies.send_text(&reply).await?;
    Ok(EventOutcome::Replied {
        chars: reply.body.chars().count(),
        recipient: reply.recipient,
    })
}

/// Router with the webhook on `gateway.webhookPath` and health on `/`.
/// A webhook path of "/" takes over the root and drops the health route.
pub fn router(state: GatewayState) -> Router {
    let webhook_path = config::resolve_webhook_path(&state.config);
    let webhook = get(webhook_verify).post(webhook_receive);
    let app = if webhook_path == "/" {
        Router::new().route("/", webhook)
    } else {
        Router::new()
            .route("/", get(health_http))
            .route(&webhook_path, webhook)
    };
    app.with_state(state)
}

/// Start the gateway: build the Ollama and WhatsApp clients, bind, and serve until SIGINT/SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    let ollama = OllamaClient::new(config::resolve_ollama_base_url(&config));
    let whatsapp = WhatsAppChannel::from_config(&config);
    if !whatsapp.is_configured() {
        log::warn!("whatsapp access token or phone number id not configured; replies will fail");
    }
    if config::resolve_verify_token(&config).is_none() {
        log::warn!("whatsapp verify token not configured; webhook handshakes will be rejected");
    }

    let state = GatewayState::new(
        config.clone(),
        Arc::new(ollama.clone()),
        Arc::new(whatsapp),
    );

    {
        let model = state.model.clone();
        tokio::spawn(async move {
            match ollama.list_models().await {
                Ok(list) => {
                    let tagged = format!("{}:latest", model);
                    if list.iter().any(|m| m.name == *model || m.name == tagged) {
                        log::info!("ollama model {} available at {}", model, ollama.base_url());
                    } else {
                        log::warn!(
                            "ollama model {} not found at {}; run `ollama pull {}`",
                            model,
                            ollama.base_url(),
                            model
                        );
                    }
                }
                Err(e) => {
                    log::warn!("ollama model discovery failed: {}", e);
                }
            }
        });
    }

    let app = router(state);
    let bind_addr = format!("{}:{}", config.gateway.bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!(
        "gateway listening on {} (webhook {})",
        bind_addr,
        config::resolve_webhook_path(&config)
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET <webhookPath> — Meta verification handshake; echoes hub.challenge when the token matches.
/// An unparseable query string gets the same rejection as a wrong token.
async fn webhook_verify(
    State(state): State<GatewayState>,
    query: Result<Query<VerifyQuery>, QueryRejection>,
) -> (StatusCode, String) {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => {
            log::warn!("webhook verification rejected: {}", e);
            return (StatusCode::BAD_REQUEST, VERIFY_REJECTED.to_string());
        }
    };
    match verify_handshake(&query, state.verify_token.as_deref()) {
        Some(challenge) => {
            log::info!("webhook verified");
            (StatusCode::OK, challenge.to_string())
        }
        None => {
            log::warn!("webhook verification rejected");
            (StatusCode::BAD_REQUEST, VERIFY_REJECTED.to_string())
        }
    }
}

/// POST <webhookPath> — message events. Always 200 so the platform does not redeliver.
/// Processing runs on its own task; errors and panics end here as log lines.
/// A body that cannot be read (e.g. over the size limit) is dropped and still acknowledged.
async fn webhook_receive(
    State(state): State<GatewayState>,
    body: Result<Bytes, BytesRejection>,
) -> StatusCode {
    let body = match body {
        Ok(b) => b,
        Err(e) => {
            log::warn!("webhook: event body rejected, dropping: {}", e);
            return StatusCode::OK;
        }
    };
    let task = tokio::spawn(async move { process_event(&state, &body).await });
    match task.await {
        Ok(Ok(EventOutcome::Replied { recipient, chars })) => {
            log::info!("webhook: replied to {} ({} chars)", recipient, chars);
        }
        Ok(Ok(EventOutcome::Ignored)) => {
            log::debug!("webhook: no text message in event");
        }
        Ok(Ok(EventOutcome::Malformed)) => {
            log::debug!("webhook: malformed event dropped");
        }
        Ok(Err(e)) => {
            log::warn!("webhook: event dropped: {}", e);
        }
        Err(e) => {
            log::error!("webhook: event task failed: {}", e);
        }
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "webhookPath": config::resolve_webhook_path(&state.config),
    }))
}
