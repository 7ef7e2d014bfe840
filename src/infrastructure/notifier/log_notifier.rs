use async_trait::async_trait;
use tracing::info;

use super::Notifier;
use crate::shared::errors::DeliveryError;
use crate::shared::types::UserId;

/// Writes alert messages to the log. Used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, user_id: &UserId, message: &str) -> Result<(), DeliveryError> {
        info!(user = %user_id, "🔔 {}", message.replace('\n', " | "));
        Ok(())
    }
}
