//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.wabot/config.json`) and environment.
//! Values are read once at startup and shared read-only for the life of the process.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (WhatsApp Business Cloud API).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Agent defaults (model and Ollama endpoint).
    #[serde(default)]
    pub agents: AgentsConfig,
}

/// Gateway bind, port, and webhook route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// HTTP port (default 5000).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Route serving both the verification handshake (GET) and events (POST).
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

fn default_gateway_port() -> u16 {
    5000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_webhook_path() -> String {
    "/api/webhook".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            webhook_path: default_webhook_path(),
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub whatsapp: WhatsAppChannelConfig,
}

/// WhatsApp Business Cloud API config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppChannelConfig {
    /// Secret configured in the Meta app dashboard for the webhook handshake. Overridden by WHATSAPP_VERIFY_TOKEN env.
    pub verify_token: Option<String>,
    /// Permanent or system-user access token for the send API. Overridden by WHATSAPP_ACCESS_TOKEN env.
    pub access_token: Option<String>,
    /// Business phone number id that replies are sent from.
    pub phone_number_id: Option<String>,
    /// Graph API base URL (default "https://graph.facebook.com").
    #[serde(default = "default_whatsapp_api_base")]
    pub api_base_url: String,
    /// Graph API version segment (default "v21.0").
    #[serde(default = "default_graph_api_version")]
    pub graph_api_version: String,
}

fn default_whatsapp_api_base() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_graph_api_version() -> String {
    "v21.0".to_string()
}

impl Default for WhatsAppChannelConfig {
    fn default() -> Self {
        Self {
            verify_token: None,
            access_token: None,
            phone_number_id: None,
            api_base_url: default_whatsapp_api_base(),
            graph_api_version: default_graph_api_version(),
        }
    }
}

/// Agent defaults (model, Ollama endpoint, reply cap).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    /// Ollama model: use the exact name from `ollama list` (e.g. "llama3", "qwen3:8b").
    pub default_model: Option<String>,
    /// Ollama base URL (default http://localhost:11434). Overridden by OLLAMA_BASE_URL env.
    pub ollama_base_url: Option<String>,
    /// Upper bound on reply length in characters. Streaming stops once reached (default 4096, the WhatsApp text limit).
    #[serde(default = "default_max_reply_chars")]
    pub max_reply_chars: usize,
}

fn default_max_reply_chars() -> usize {
    4096
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            ollama_base_url: None,
            max_reply_chars: default_max_reply_chars(),
        }
    }
}

pub const DEFAULT_MODEL: &str = "llama3";

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Overlay WHATSAPP_VERIFY_TOKEN, WHATSAPP_ACCESS_TOKEN and OLLAMA_BASE_URL from the environment.
/// Blank variables are ignored. Called by `load_config`.
pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| non_blank(lookup(key).as_ref());
    if let Some(v) = get("WHATSAPP_VERIFY_TOKEN") {
        config.channels.whatsapp.verify_token = Some(v);
    }
    if let Some(v) = get("WHATSAPP_ACCESS_TOKEN") {
        config.channels.whatsapp.access_token = Some(v);
    }
    if let Some(v) = get("OLLAMA_BASE_URL") {
        config.agents.ollama_base_url = Some(v);
    }
}

/// Webhook verify token, trimmed; None when unset or blank.
pub fn resolve_verify_token(config: &Config) -> Option<String> {
    non_blank(config.channels.whatsapp.verify_token.as_ref())
}

/// WhatsApp access token, trimmed; None when unset or blank.
pub fn resolve_access_token(config: &Config) -> Option<String> {
    non_blank(config.channels.whatsapp.access_token.as_ref())
}

/// Ollama base URL. None means the client default.
pub fn resolve_ollama_base_url(config: &Config) -> Option<String> {
    non_blank(config.agents.ollama_base_url.as_ref())
}

/// Resolve the model name, falling back to DEFAULT_MODEL when unset or blank.
pub fn resolve_model(config: &Config) -> String {
    config
        .agents
        .default_model
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_MODEL)
        .to_string()
}

/// Webhook route with a leading slash; blank falls back to "/api/webhook".
pub fn resolve_webhook_path(config: &Config) -> String {
    let p = config.gateway.webhook_path.trim();
    if p.is_empty() {
        default_webhook_path()
    } else if p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{}", p)
    }
}

/// Reply cap in characters; 0 is treated as unset.
pub fn resolve_max_reply_chars(config: &Config) -> usize {
    match config.agents.max_reply_chars {
        0 => default_max_reply_chars(),
        n => n,
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("WABOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".wabot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path (or WABOT_CONFIG_PATH). Missing file => default config.
/// Environment overrides are applied on top. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config: Config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_env_overrides(&mut config);
    Ok((config, path))
}
