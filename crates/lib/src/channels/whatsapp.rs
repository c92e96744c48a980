//! WhatsApp channel: send text replies via the Business Cloud API messages endpoint.

use crate::channels::reply::{ReplySender, SendError, TextReply};
use crate::config::{self, Config};
use async_trait::async_trait;
use serde::Serialize;

/// WhatsApp Cloud API client for outbound messages. Inbound events arrive on the gateway webhook.
pub struct WhatsAppChannel {
    id: String,
    access_token: Option<String>,
    phone_number_id: Option<String>,
    api_base_url: String,
    graph_api_version: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    typ: &'static str,
    text: SendTextBody<'a>,
}

#[derive(Debug, Serialize)]
struct SendTextBody<'a> {
    preview_url: bool,
    body: &'a str,
}

impl WhatsAppChannel {
    pub fn new(
        access_token: Option<String>,
        phone_number_id: Option<String>,
        api_base_url: &str,
        graph_api_version: &str,
    ) -> Self {
        Self {
            id: "whatsapp".to_string(),
            access_token,
            phone_number_id,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            graph_api_version: graph_api_version.trim_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from config (env overrides already applied by `load_config`).
    pub fn from_config(config: &Config) -> Self {
        let wa = &config.channels.whatsapp;
        Self::new(
            config::resolve_access_token(config),
            wa.phone_number_id
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            &wa.api_base_url,
            &wa.graph_api_version,
        )
    }

    /// True when both the access token and phone number id are set.
    pub fn is_configured(&self) -> bool {
        self.access_token.is_some() && self.phone_number_id.is_some()
    }

    fn messages_url(&self, phone_number_id: &str) -> String {
        format!(
            "{}/{}/{}/messages",
            self.api_base_url, self.graph_api_version, phone_number_id
        )
    }

    /// Send a text message via POST /{version}/{phone-number-id}/messages.
    pub async fn send_text_message(&self, reply: &TextReply) -> Result<(), SendError> {
        let token = self
            .access_token
            .as_ref()
            .ok_or(SendError::NotConfigured("whatsapp access token"))?;
        let phone_number_id = self
            .phone_number_id
            .as_ref()
            .ok_or(SendError::NotConfigured("whatsapp phone number id"))?;
        let body = SendTextRequest {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: &reply.recipient,
            typ: "text",
            text: SendTextBody {
                preview_url: reply.preview_url,
                body: &reply.body,
            },
        };
        let res = self
            .client
            .post(self.messages_url(phone_number_id))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SendError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl ReplySender for WhatsAppChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_text(&self, reply: &TextReply) -> Result<(), SendError> {
        self.send_text_message(reply).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<(String, Option<String>, Value)>>>;

    async fn capture(
        State(captured): State<Captured>,
        Path((version, phone)): Path<(String, String)>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        captured
            .lock()
            .unwrap()
            .push((format!("{}/{}", version, phone), auth, body));
        StatusCode::OK
    }

    async fn spawn_fake_graph_api(status_ok: bool) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let app = if status_ok {
            Router::new().route("/:version/:phone/messages", post(capture))
        } else {
            Router::new().route(
                "/:version/:phone/messages",
                post(|| async { (StatusCode::UNAUTHORIZED, "invalid token") }),
            )
        }
        .with_state(captured.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{}", addr), captured)
    }

    #[tokio::test]
    async fn send_posts_cloud_api_text_message() {
        let (base, captured) = spawn_fake_graph_api(true).await;
        let channel = WhatsAppChannel::new(
            Some("EAAG-token".to_string()),
            Some("106540352242922".to_string()),
            &format!("{}/", base),
            "v21.0",
        );
        channel
            .send_text(&TextReply::new("5511999999999", "Hello!"))
            .await
            .unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (path, auth, body) = &captured[0];
        assert_eq!(path, "v21.0/106540352242922");
        assert_eq!(auth.as_deref(), Some("Bearer EAAG-token"));
        assert_eq!(body["messaging_product"], "whatsapp");
        assert_eq!(body["recipient_type"], "individual");
        assert_eq!(body["to"], "5511999999999");
        assert_eq!(body["type"], "text");
        assert_eq!(body["text"]["body"], "Hello!");
        assert_eq!(body["text"]["preview_url"], false);
    }

    #[tokio::test]
    async fn send_surfaces_api_errors() {
        let (base, _) = spawn_fake_graph_api(false).await;
        let channel = WhatsAppChannel::new(
            Some("bad".to_string()),
            Some("1".to_string()),
            &base,
            "v21.0",
        );
        match channel.send_text(&TextReply::new("1", "x")).await {
            Err(SendError::Api(msg)) => assert!(msg.contains("401"), "{}", msg),
            other => panic!("expected api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_without_credentials_is_not_configured() {
        let channel = WhatsAppChannel::new(None, Some("1".to_string()), "http://unused", "v21.0");
        assert!(!channel.is_configured());
        assert!(matches!(
            channel.send_text(&TextReply::new("1", "x")).await,
            Err(SendError::NotConfigured(_))
        ));

        let channel = WhatsAppChannel::new(Some("t".to_string()), None, "http://unused", "v21.0");
        assert!(matches!(
            channel.send_text(&TextReply::new("1", "x")).await,
            Err(SendError::NotConfigured(_))
        ));
    }

    #[test]
    fn messages_url_joins_base_version_and_phone() {
        let channel = WhatsAppChannel::new(None, None, "https://graph.facebook.com/", "/v21.0/");
        assert_eq!(
            channel.messages_url("42"),
            "https://graph.facebook.com/v21.0/42/messages"
        );
    }
}
