//! Generic HTTP webhook transport: one JSON POST per message.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lookout_core::{Delivery, LookoutError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs `{recipient_kind, recipient_id, text, timestamp}` to a fixed URL.
pub struct WebhookDelivery {
    url: String,
    client: reqwest::Client,
}

impl WebhookDelivery {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, recipient_kind: &str, recipient_id: &str, text: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&payload(recipient_kind, recipient_id, text, Utc::now()))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| LookoutError::Delivery(format!("Webhook send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::debug!("✅ Webhook delivered to {recipient_kind}:{recipient_id}");
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(LookoutError::Delivery(format!("Webhook error {status}: {body}")))
        }
    }
}

fn payload(
    recipient_kind: &str,
    recipient_id: &str,
    text: &str,
    timestamp: DateTime<Utc>,
) -> serde_json::Value {
    serde_json::json!({
        "recipient_kind": recipient_kind,
        "recipient_id": recipient_id,
        "text": text,
        "timestamp": timestamp.to_rfc3339(),
    })
}

#[async_trait]
impl Delivery for WebhookDelivery {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send_to_user(&self, user_id: &str, text: &str) -> Result<()> {
        self.post("user", user_id, text).await
    }

    async fn send_to_channel(&self, channel_id: &str, text: &str) -> Result<()> {
        self.post("channel", channel_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_payload_shape() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let body = payload("channel", "c1", "stand-up", at);
        assert_eq!(body["recipient_kind"], "channel");
        assert_eq!(body["recipient_id"], "c1");
        assert_eq!(body["text"], "stand-up");
        assert_eq!(body["timestamp"], "2026-03-01T09:00:00+00:00");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_delivery_error() {
        let delivery = WebhookDelivery::new("http://127.0.0.1:1/hook");
        let err = delivery.send_to_user("u1", "hi").await.unwrap_err();
        assert!(matches!(err, LookoutError::Delivery(_)));
    }
}
