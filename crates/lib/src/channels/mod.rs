//! Communication channels (WhatsApp Business Cloud API).
//!
//! Inbound: webhook payloads are reduced to an `InboundMessage` by `extract_message`.
//! Outbound: replies go through the `ReplySender` capability, implemented by `WhatsAppChannel`.

mod inbound;
mod reply;
mod whatsapp;

pub use inbound::{extract_message, InboundMessage};
pub use reply::{ReplySender, SendError, TextReply};
pub use whatsapp::WhatsAppChannel;
