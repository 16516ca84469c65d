//! Discord REST transport: bot-token authenticated calls to the HTTP API.
//!
//! Only the handful of endpoints the notifier needs: open a DM channel,
//! post a message, and resolve user and guild names for alert texts.

use std::time::Duration;

use async_trait::async_trait;
use lookout_core::{Delivery, LookoutError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Discord rejects message content above this many characters.
const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
struct DmChannel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    username: String,
    #[serde(default)]
    global_name: Option<String>,
}

impl DiscordUser {
    fn display(self) -> String {
        self.global_name
            .filter(|name| !name.is_empty())
            .unwrap_or(self.username)
    }
}

#[derive(Debug, Deserialize)]
struct Guild {
    name: String,
}

/// Discord bot delivering DMs and channel messages.
pub struct DiscordDelivery {
    token: String,
    api_base: String,
    client: reqwest::Client,
}

impl DiscordDelivery {
    pub fn new(token: &str, api_base: &str) -> Self {
        Self {
            token: token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder, what: &str) -> Result<T> {
        let resp = req
            .header("Authorization", format!("Bot {}", self.token))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| LookoutError::Delivery(format!("Discord {what} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LookoutError::Delivery(format!(
                "Discord {what} error {status}: {body}"
            )));
        }
        resp.json()
            .await
            .map_err(|e| LookoutError::Delivery(format!("Invalid Discord {what} response: {e}")))
    }

    /// Open (or reuse) the DM channel with a user.
    async fn open_dm(&self, user_id: &str) -> Result<String> {
        let req = self
            .client
            .post(self.api_url("users/@me/channels"))
            .json(&serde_json::json!({ "recipient_id": user_id }));
        let channel: DmChannel = self.send(req, "open DM").await?;
        Ok(channel.id)
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<()> {
        let req = self
            .client
            .post(self.api_url(&format!("channels/{channel_id}/messages")))
            .json(&serde_json::json!({ "content": clamp_content(text) }));
        let _: serde_json::Value = self.send(req, "send message").await?;
        Ok(())
    }
}

fn clamp_content(text: &str) -> String {
    text.chars().take(MAX_CONTENT_CHARS).collect()
}

#[async_trait]
impl Delivery for DiscordDelivery {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send_to_user(&self, user_id: &str, text: &str) -> Result<()> {
        let channel_id = self.open_dm(user_id).await?;
        self.post_message(&channel_id, text).await?;
        tracing::debug!("✅ Discord DM sent to {user_id}");
        Ok(())
    }

    async fn send_to_channel(&self, channel_id: &str, text: &str) -> Result<()> {
        self.post_message(channel_id, text).await?;
        tracing::debug!("✅ Discord message sent to #{channel_id}");
        Ok(())
    }

    async fn display_name(&self, user_id: &str) -> Option<String> {
        let req = self.client.get(self.api_url(&format!("users/{user_id}")));
        match self.send::<DiscordUser>(req, "fetch user").await {
            Ok(user) => Some(user.display()),
            Err(e) => {
                tracing::debug!("Display name lookup for {user_id}: {e}");
                None
            }
        }
    }

    async fn space_name(&self, space_id: &str) -> Option<String> {
        let req = self.client.get(self.api_url(&format!("guilds/{space_id}")));
        match self.send::<Guild>(req, "fetch guild").await {
            Ok(guild) => Some(guild.name),
            Err(e) => {
                tracing::debug!("Guild name lookup for {space_id}: {e}");
                None
            }
        }
    }
}
