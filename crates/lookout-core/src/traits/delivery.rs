//! Message delivery contract.

use async_trait::async_trait;

use crate::error::Result;

/// Outbound transport for notifications.
///
/// Implementations report failures through `Err`; the [`Dispatcher`](crate::notify::Dispatcher)
/// is the boundary that logs and swallows them.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn name(&self) -> &str;

    /// Send a direct message to a user.
    async fn send_to_user(&self, user_id: &str, text: &str) -> Result<()>;

    /// Post a message in a channel.
    async fn send_to_channel(&self, channel_id: &str, text: &str) -> Result<()>;

    /// Human-readable name of a user, when the transport can resolve it.
    async fn display_name(&self, _user_id: &str) -> Option<String> {
        None
    }

    /// Human-readable name of a space, when the transport can resolve it.
    async fn space_name(&self, _space_id: &str) -> Option<String> {
        None
    }
}
