//! # Lookout Channels
//! Outbound delivery transports.
//!
//! Every transport implements [`lookout_core::Delivery`]; the binary picks one
//! from `[delivery] mode` with [`delivery_from_config`].

pub mod discord;
pub mod log;
pub mod webhook;

use std::sync::Arc;

use lookout_core::Delivery;
use lookout_core::config::{DeliveryConfig, DeliveryMode};

pub use discord::DiscordDelivery;
pub use log::LogDelivery;
pub use webhook::WebhookDelivery;

/// Build the transport selected by the configuration.
pub fn delivery_from_config(config: &DeliveryConfig) -> Arc<dyn Delivery> {
    match config.mode {
        DeliveryMode::Discord => Arc::new(DiscordDelivery::new(
            &config.discord_token,
            &config.discord_api_base,
        )),
        DeliveryMode::Webhook => Arc::new(WebhookDelivery::new(&config.webhook_url)),
        DeliveryMode::Log => Arc::new(LogDelivery),
    }
}
