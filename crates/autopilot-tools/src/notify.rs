//! Notification dispatch.

use async_trait::async_trait;
use std::time::Duration;

use crate::collaborators::Notifier;
use crate::error::ActionError;

/// Notifier that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, channel: &str, payload: &serde_json::Value) -> Result<(), ActionError> {
        tracing::info!(channel, payload = %payload, "Notification");
        Ok(())
    }
}

/// Notifier that posts `{channel, payload}` to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, ActionError> {
        let url = url.into();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ActionError::Configuration(format!(
                "Webhook URL must be http(s): {}",
                url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, channel: &str, payload: &serde_json::Value) -> Result<(), ActionError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "channel": channel,
                "payload": payload,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ActionError::collaborator(
                "notify",
                format!("webhook returned {}", response.status().as_u16()),
            ));
        }
        Ok(())
    }
}
