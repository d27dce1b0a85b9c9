// =============================================================================
// WHATSAPP CLOUD API SENDER
// =============================================================================
//
// Outbound text messages go through the Graph API:
//   POST {base}/{version}/{phone_number_id}/messages
// Replies longer than WhatsApp's limit are sent as several messages, in order.

use crate::core::ai::formatting::{split_message, WHATSAPP_MAX_MESSAGE_CHARS};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const GRAPH_BASE_URL: &str = "https://graph.facebook.com";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WhatsApp API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Delivers a text reply to a chat.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), TransportError>;
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    body: &'a str,
    preview_url: bool,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
    message: String,
}

pub struct WhatsAppCloudClient {
    client: Client,
    access_token: String,
    phone_number_id: String,
    api_version: String,
    base_url: String,
}

impl WhatsAppCloudClient {
    pub fn new(access_token: String, phone_number_id: String, api_version: String) -> Self {
        Self {
            client: Client::new(),
            access_token,
            phone_number_id,
            api_version,
            base_url: GRAPH_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/{}/messages",
            self.base_url.trim_end_matches('/'),
            self.api_version,
            self.phone_number_id
        )
    }

    async fn send_chunk(&self, to: &str, body: &str) -> Result<(), TransportError> {
        let message = TextMessage {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to,
            kind: "text",
            text: TextBody {
                body,
                preview_url: false,
            },
        };

        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.access_token)
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let raw = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GraphErrorBody>(&raw)
            .map(|body| body.error.message)
            .unwrap_or(raw);
        Err(TransportError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl MessageSender for WhatsAppCloudClient {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), TransportError> {
        let chunks = split_message(text, WHATSAPP_MAX_MESSAGE_CHARS);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            self.send_chunk(to, chunk).await?;
            tracing::debug!(to, part = i + 1, total, "Sent WhatsApp message");
        }
        Ok(())
    }
}
