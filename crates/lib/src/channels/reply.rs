//! Send-reply capability: deliver a text message to a channel recipient.

use async_trait::async_trait;

/// Outbound text reply addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextReply {
    pub recipient: String,
    pub body: String,
    pub preview_url: bool,
}

impl TextReply {
    /// Plain text reply with link previews disabled.
    pub fn new(recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            body: body.into(),
            preview_url: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("send request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("send api error: {0}")]
    Api(String),
    #[error("channel not configured: {0}")]
    NotConfigured(&'static str),
}

/// Handle that can deliver replies (e.g. the WhatsApp Cloud API client).
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Channel id (e.g. "whatsapp").
    fn id(&self) -> &str;
    /// Submit the reply. Success means the platform accepted the request.
    async fn send_text(&self, reply: &TextReply) -> Result<(), SendError>;
}
