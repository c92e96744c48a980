//! Inbound message from a webhook payload: the sender and the text to answer.

use serde_json::Value;

/// A text message from a WhatsApp user. Both fields are non-blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender's WhatsApp id (phone number in international format, no `+`).
    pub sender: String,
    pub text: String,
}

/// Reduce a webhook payload to the text message it carries, if any.
///
/// Reads `entry[0].changes[0].value.messages[0]` and takes `from` and `text.body`.
/// Status callbacks, delivery receipts, non-text messages and malformed bodies all
/// yield `None`. Only the first entry, change and message are looked at; a payload
/// batching several messages gets only its first one answered.
pub fn extract_message(payload: &Value) -> Option<InboundMessage> {
    let message = payload
        .get("entry")?
        .get(0)?
        .get("changes")?
        .get(0)?
        .get("value")?
        .get("messages")?
        .get(0)?;
    let sender = message.get("from")?.as_str()?;
    let text = message.get("text")?.get("body")?.as_str()?;
    if sender.trim().is_empty() || text.trim().is_empty() {
        return None;
    }
    Some(InboundMessage {
        sender: sender.to_string(),
        text: text.to_string(),
    })
}
