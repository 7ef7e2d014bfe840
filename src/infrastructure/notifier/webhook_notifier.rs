use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::Notifier;
use crate::shared::errors::{AppError, DeliveryError};
use crate::shared::types::UserId;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    user_id: &'a str,
    content: &'a str,
}

/// POSTs `{"user_id", "content"}` JSON to a fixed endpoint
#[derive(Clone)]
pub struct WebhookNotifier {
    http: Client,
    endpoint: Url,
}

impl WebhookNotifier {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, AppError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| AppError::ConfigError(format!("Invalid webhook URL '{}': {}", endpoint, e)))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, user_id: &UserId, message: &str) -> Result<(), DeliveryError> {
        let payload = WebhookPayload {
            user_id: user_id.as_str(),
            content: message,
        };

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError(format!("Webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError(format!("Webhook returned HTTP {}", status)));
        }

        debug!(user = %user_id, endpoint = %self.endpoint, "alert delivered");
        Ok(())
    }
}
