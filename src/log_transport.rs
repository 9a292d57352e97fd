//! Transport that writes notifications to the log instead of a gateway.

use async_trait::async_trait;
use nudge_core::traits::NotificationTransport;
use nudge_core::{EmailPayload, PushPayload, Result};

pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send_push(&self, payload: &PushPayload) -> Result<()> {
        tracing::info!(
            "📱 Push → {} [{}] {}",
            payload.user_id,
            payload.title,
            payload.body.en
        );
        tracing::debug!("push payload: {}", serde_json::to_string(payload)?);
        Ok(())
    }

    async fn send_email(&self, payload: &EmailPayload) -> Result<()> {
        tracing::info!(
            "📧 Email → {} [{}] {}",
            payload.user_id,
            payload.subject,
            payload.body.en
        );
        Ok(())
    }
}
