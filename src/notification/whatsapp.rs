//! A client for delivering alerts through a WhatsApp messaging API.

use crate::config::WhatsAppConfig;
use crate::core::{AlertRequest, Channel, ChannelSender, Delivery};
use crate::notification::ChannelError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info, instrument};

/// Sends alerts as a single text message to a fixed phone number.
pub struct WhatsAppSender {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    to: String,
}

impl WhatsAppSender {
    /// Creates a new `WhatsAppSender` whose HTTP calls are bounded by `timeout`.
    pub fn new(config: &WhatsAppConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
            to: config.to.clone(),
        })
    }

    /// Renders an alert as one line prefixed with a warning marker.
    pub fn format_message(request: &AlertRequest) -> String {
        let text = format!("⚠️ {}: {}", request.subject, request.body);
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl ChannelSender for WhatsAppSender {
    fn channel(&self) -> Channel {
        Channel::WhatsApp
    }

    #[instrument(skip_all, fields(to = %self.to))]
    async fn send(&self, request: &AlertRequest) -> Result<Delivery, ChannelError> {
        let Some(token) = &self.token else {
            return Err(ChannelError::Configuration(
                "WhatsApp API token not configured".to_string(),
            ));
        };

        let payload = json!({
            "messaging_product": "whatsapp",
            "to": self.to,
            "type": "text",
            "text": { "body": Self::format_message(request) },
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP request to WhatsApp API failed");
                if e.is_timeout() {
                    ChannelError::Transport(format!("WhatsApp API request timed out: {}", e))
                } else {
                    ChannelError::Transport(format!("WhatsApp API request failed: {}", e))
                }
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(status = %status, body = %text, "WhatsApp API rejected the message");
            return Err(ChannelError::Transport(format!(
                "WhatsApp API returned status {}, body: {}",
                status, text
            )));
        }

        info!("Alert delivered to WhatsApp API.");
        let receipt = serde_json::from_str::<Value>(&text).ok().and_then(|body| {
            body.pointer("/messages/0/id")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        Ok(Delivery { receipt })
    }
}
