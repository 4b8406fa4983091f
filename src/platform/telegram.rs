use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TelegramConfig;
use crate::error::RelayError;

/// Body of a `sendMessage` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundReply {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
}

impl OutboundReply {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            parse_mode: None,
        }
    }
}

/// The subset of the Bot API the relay calls.
#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn send_message(&self, reply: &OutboundReply) -> Result<(), RelayError>;

    /// Raw `getWebhookInfo` response, relayed verbatim by the dispatcher.
    async fn get_webhook_info(&self) -> Result<serde_json::Value, RelayError>;
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Bot API client over reqwest.
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// Read the body, rejecting non-2xx statuses and `ok: false` envelopes.
    async fn checked_json(
        method: &str,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, RelayError> {
        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(RelayError::Upstream(format!(
                "{} failed ({}): {}",
                method, status, error_body
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| {
                RelayError::Upstream(format!("{method} returned invalid JSON: {}", e.without_url()))
            })?;

        if let Ok(envelope) = serde_json::from_value::<ApiEnvelope>(body.clone()) {
            if !envelope.ok {
                return Err(RelayError::Upstream(format!(
                    "{} rejected: {}",
                    method,
                    envelope.description.unwrap_or_else(|| "no description".into())
                )));
            }
        }
        Ok(body)
    }
}

#[async_trait]
impl TelegramApi for TelegramClient {
    async fn send_message(&self, reply: &OutboundReply) -> Result<(), RelayError> {
        debug!("Sending message to chat {}", reply.chat_id);
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(reply)
            .send()
            .await?;
        Self::checked_json("sendMessage", response).await?;
        Ok(())
    }

    async fn get_webhook_info(&self) -> Result<serde_json::Value, RelayError> {
        debug!("Fetching webhook info");
        let response = self
            .client
            .get(self.method_url("getWebhookInfo"))
            .send()
            .await?;
        Self::checked_json("getWebhookInfo", response).await
    }
}
