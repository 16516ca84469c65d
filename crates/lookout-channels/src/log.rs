//! Dry-run transport: messages go to the log only.

use async_trait::async_trait;
use lookout_core::{Delivery, Result};

/// Logs every message and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

#[async_trait]
impl Delivery for LogDelivery {
    fn name(&self) -> &str {
        "log"
    }

    async fn send_to_user(&self, user_id: &str, text: &str) -> Result<()> {
        tracing::info!("📨 [dm → {user_id}] {text}");
        Ok(())
    }

    async fn send_to_channel(&self, channel_id: &str, text: &str) -> Result<()> {
        tracing::info!("📨 [#{channel_id}] {text}");
        Ok(())
    }
}
