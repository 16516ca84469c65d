//! Notification dispatch: resolves message text and hands it to the
//! configured [`Delivery`] transport.
//!
//! Delivery failures never cross this boundary: every attempt is bounded by a
//! timeout, logged, and reported as a plain `bool`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::traits::Delivery;
use crate::types::{Axis, Recipient, RuleId};

/// Human-formatted duration: `45 minutes`, `2 heures`, `1h30`.
pub fn format_duration(minutes: u32) -> String {
    if minutes < 60 {
        return format!("{minutes} minute{}", plural(minutes));
    }
    let hours = minutes / 60;
    let rest = minutes % 60;
    if rest == 0 {
        format!("{hours} heure{}", plural(hours))
    } else {
        format!("{hours}h{rest:02}")
    }
}

fn plural(n: u32) -> &'static str {
    if n > 1 { "s" } else { "" }
}

/// Substitute `{user}`, `{duration}` and `{type}`. Anything else is left as is.
///
/// Single pass: substituted values are never scanned again.
pub fn render_template(template: &str, user: &str, duration: &str, kind: &str) -> String {
    let placeholders = [("{user}", user), ("{duration}", duration), ("{type}", kind)];
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        rest = &rest[open..];
        match placeholders.iter().find(|(name, _)| rest.starts_with(name)) {
            Some((name, value)) => {
                out.push_str(value);
                rest = &rest[name.len()..];
            }
            None => {
                out.push('{');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Built-in alert text used when a rule carries no template.
pub fn default_alert_text(
    axis: Axis,
    user: &str,
    duration: &str,
    activity_name: Option<&str>,
    space_name: Option<&str>,
) -> String {
    let place = space_name
        .map(|s| format!(" sur **{s}**"))
        .unwrap_or_default();
    match axis {
        Axis::Gaming => {
            let game = activity_name
                .map(|g| format!(" à **{g}**"))
                .unwrap_or_default();
            format!("🎮 **{user}** joue{game} depuis plus de {duration}{place} !")
        }
        Axis::Voice => {
            format!("🎙️ **{user}** est en vocal depuis plus de {duration}{place} !")
        }
    }
}

/// Everything needed to word and address one fired activity alert.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityAlert {
    pub rule_id: RuleId,
    pub observer_id: String,
    pub target_id: String,
    pub space_id: Option<String>,
    pub axis: Axis,
    pub threshold_minutes: u32,
    pub template: Option<String>,
    /// Name of the game, for gaming alerts, when the presence carried one.
    pub activity_name: Option<String>,
}

/// Sends resolved text through a delivery transport.
#[derive(Clone)]
pub struct Dispatcher {
    delivery: Arc<dyn Delivery>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(delivery: Arc<dyn Delivery>, timeout: Duration) -> Self {
        Self { delivery, timeout }
    }

    /// Name of the underlying transport.
    pub fn transport(&self) -> &str {
        self.delivery.name()
    }

    /// Deliver `text` to `recipient`. Returns `false` on failure or timeout.
    pub async fn deliver(&self, recipient: &Recipient, text: &str) -> bool {
        let send = async {
            match recipient {
                Recipient::User(id) => self.delivery.send_to_user(id, text).await,
                Recipient::Channel(id) => self.delivery.send_to_channel(id, text).await,
            }
        };
        match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(())) => {
                tracing::debug!("📨 Delivered to {} via {}", recipient, self.transport());
                true
            }
            Ok(Err(e)) => {
                tracing::warn!("⚠️ Delivery to {} failed: {e}", recipient);
                false
            }
            Err(_) => {
                tracing::warn!(
                    "⚠️ Delivery to {} timed out after {:?}",
                    recipient,
                    self.timeout
                );
                false
            }
        }
    }

    /// Run [`deliver`](Self::deliver) detached from the caller.
    pub fn spawn_deliver(&self, recipient: Recipient, text: String) -> JoinHandle<bool> {
        let this = self.clone();
        tokio::spawn(async move { this.deliver(&recipient, &text).await })
    }

    /// Display name of a user, falling back to the raw id.
    pub async fn display_name(&self, user_id: &str) -> String {
        tokio::time::timeout(self.timeout, self.delivery.display_name(user_id))
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| user_id.to_string())
    }

    pub async fn space_name(&self, space_id: &str) -> Option<String> {
        tokio::time::timeout(self.timeout, self.delivery.space_name(space_id))
            .await
            .ok()
            .flatten()
    }

    /// Word an activity alert and send it to the rule's observer.
    pub async fn send_alert(&self, alert: &ActivityAlert) -> bool {
        let user = self.display_name(&alert.target_id).await;
        let duration = format_duration(alert.threshold_minutes);
        let text = match &alert.template {
            Some(template) => render_template(template, &user, &duration, alert.axis.verb()),
            None => {
                let space = match &alert.space_id {
                    Some(id) => self.space_name(id).await,
                    None => None,
                };
                default_alert_text(
                    alert.axis,
                    &user,
                    &duration,
                    alert.activity_name.as_deref(),
                    space.as_deref(),
                )
            }
        };
        let delivered = self
            .deliver(&Recipient::User(alert.observer_id.clone()), &text)
            .await;
        if delivered {
            tracing::info!(
                "🔔 Alert #{} sent to {} for {} ({})",
                alert.rule_id,
                alert.observer_id,
                alert.target_id,
                alert.axis
            );
        }
        delivered
    }

    /// [`send_alert`](Self::send_alert) detached from the caller.
    pub fn spawn_alert(&self, alert: ActivityAlert) -> JoinHandle<bool> {
        let this = self.clone();
        tokio::spawn(async move { this.send_alert(&alert).await })
    }
}
