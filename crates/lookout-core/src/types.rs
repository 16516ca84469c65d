//! Domain types: alert rules, reminder jobs and the handles they point at.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{LookoutError, Result};

pub type RuleId = i64;
pub type JobId = i64;

/// One of the two independently tracked activity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Gaming,
    Voice,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::Gaming, Axis::Voice];

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Gaming => "gaming",
            Axis::Voice => "voice",
        }
    }

    /// Verb phrase used for the `{type}` placeholder.
    pub fn verb(&self) -> &'static str {
        match self {
            Axis::Gaming => "joue",
            Axis::Voice => "est en vocal",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which axes an alert rule watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Gaming,
    Voice,
    Both,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Gaming => "gaming",
            AlertKind::Voice => "voice",
            AlertKind::Both => "both",
        }
    }

    pub fn covers(&self, axis: Axis) -> bool {
        matches!(
            (self, axis),
            (AlertKind::Both, _)
                | (AlertKind::Gaming, Axis::Gaming)
                | (AlertKind::Voice, Axis::Voice)
        )
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = LookoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gaming" => Ok(AlertKind::Gaming),
            "voice" => Ok(AlertKind::Voice),
            "both" => Ok(AlertKind::Both),
            other => Err(LookoutError::Validation(format!(
                "unknown alert kind '{other}' (expected gaming, voice or both)"
            ))),
        }
    }
}

/// A persisted watch: notify `observer_id` once `target_id` has been active
/// for `threshold_minutes` in `space_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: RuleId,
    /// `None` means the rule was created outside any space (direct messages).
    pub space_id: Option<String>,
    pub target_id: String,
    pub observer_id: String,
    pub kind: AlertKind,
    pub threshold_minutes: u32,
    /// Optional template with `{user}`, `{duration}` and `{type}` placeholders.
    pub message: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl AlertRule {
    pub fn threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.threshold_minutes))
    }
}

/// Input for creating an alert rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlertRule {
    pub space_id: Option<String>,
    pub target_id: String,
    pub observer_id: String,
    pub kind: AlertKind,
    pub threshold_minutes: u32,
    pub message: Option<String>,
}

impl NewAlertRule {
    /// Reject input that must never reach the store.
    pub fn validate(&self) -> Result<()> {
        if self.target_id.trim().is_empty() {
            return Err(LookoutError::Validation("target id is required".into()));
        }
        if self.observer_id.trim().is_empty() {
            return Err(LookoutError::Validation("observer id is required".into()));
        }
        if self.threshold_minutes == 0 {
            return Err(LookoutError::Validation(
                "threshold must be a positive number of minutes".into(),
            ));
        }
        Ok(())
    }
}

/// Where a message goes: a user (direct message) or a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Recipient {
    User(String),
    Channel(String),
}

impl Recipient {
    pub fn id(&self) -> &str {
        match self {
            Recipient::User(id) | Recipient::Channel(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Recipient::User(_) => "user",
            Recipient::Channel(_) => "channel",
        }
    }

    /// Stored form: `user:<id>` or `channel:<id>`.
    pub fn handle(&self) -> String {
        format!("{}:{}", self.kind(), self.id())
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

impl FromStr for Recipient {
    type Err = LookoutError;

    /// Accepts `user:<id>`, `channel:<id>`, or a bare id (treated as a user).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (kind, id) = match s.split_once(':') {
            Some((kind, id)) => (kind, id.trim()),
            None => ("user", s),
        };
        if id.is_empty() {
            return Err(LookoutError::Validation(format!("empty recipient handle '{s}'")));
        }
        match kind {
            "user" => Ok(Recipient::User(id.to_string())),
            "channel" => Ok(Recipient::Channel(id.to_string())),
            other => Err(LookoutError::Validation(format!(
                "unknown recipient kind '{other}' (expected user or channel)"
            ))),
        }
    }
}

/// A persisted recurring message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderJob {
    pub id: JobId,
    pub space_id: Option<String>,
    pub recipient: Recipient,
    pub message: String,
    pub cron_expression: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a reminder job. The cron expression is checked by the
/// scheduler before the job is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReminderJob {
    pub space_id: Option<String>,
    pub recipient: Recipient,
    pub message: String,
    pub cron_expression: String,
    pub created_by: String,
}

impl NewReminderJob {
    pub fn validate_fields(&self) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(LookoutError::Validation("message is required".into()));
        }
        if self.created_by.trim().is_empty() {
            return Err(LookoutError::Validation("creator id is required".into()));
        }
        if self.cron_expression.trim().is_empty() {
            return Err(LookoutError::Validation("cron expression is required".into()));
        }
        Ok(())
    }
}
