//! Delivery sinks for alert messages

pub mod log_notifier;
pub mod webhook_notifier;

pub use log_notifier::LogNotifier;
pub use webhook_notifier::WebhookNotifier;

use async_trait::async_trait;
use std::sync::Arc;

use crate::shared::config::MonitorConfig;
use crate::shared::errors::{AppError, DeliveryError};
use crate::shared::types::UserId;

/// Where fired-alert messages go. Delivery is at-most-once: callers log a
/// failure and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, user_id: &UserId, message: &str) -> Result<(), DeliveryError>;
}

/// Pick the sink the configuration asks for
pub fn notifier_from_config(config: &MonitorConfig) -> Result<Arc<dyn Notifier>, AppError> {
    match &config.notifier_webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url, config.request_timeout())?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
