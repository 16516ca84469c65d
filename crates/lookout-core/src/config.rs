//! Lookout configuration system.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LookoutError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookoutConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

fn default_database_path() -> String { "~/.lookout/lookout.db".into() }

impl Default for LookoutConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            tracker: TrackerConfig::default(),
            scheduler: SchedulerConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl LookoutConfig {
    /// Load config from the default path (~/.lookout/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default().with_env_overrides())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LookoutError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse a TOML document and apply environment overrides.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| LookoutError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config.with_env_overrides())
    }

    /// `DISCORD_TOKEN` and `LOOKOUT_DATABASE_PATH` win over the file.
    fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var("DISCORD_TOKEN")
            && !token.is_empty()
        {
            self.delivery.discord_token = token;
        }
        if let Ok(path) = std::env::var("LOOKOUT_DATABASE_PATH")
            && !path.is_empty()
        {
            self.database_path = path;
        }
        self
    }

    /// Reject configurations the runtime cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.tracker.check_interval_secs == 0 {
            return Err(LookoutError::Config(
                "tracker.check_interval_secs must be greater than 0".into(),
            ));
        }
        if self.tracker.delivery_timeout_secs == 0 {
            return Err(LookoutError::Config(
                "tracker.delivery_timeout_secs must be greater than 0".into(),
            ));
        }
        self.scheduler.offset()?;
        match self.delivery.mode {
            DeliveryMode::Discord if self.delivery.discord_token.is_empty() => Err(
                LookoutError::Config("DISCORD_TOKEN is required for discord delivery".into()),
            ),
            DeliveryMode::Webhook if self.delivery.webhook_url.is_empty() => Err(
                LookoutError::Config("delivery.webhook_url is required for webhook delivery".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Database path with `~` expanded.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.database_path).to_string())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Lookout home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lookout")
    }
}

/// Activity tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Seconds between two matcher ticks.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Upper bound for a single delivery attempt.
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,
}

fn default_check_interval() -> u64 { 60 }
fn default_delivery_timeout() -> u64 { 10 }

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            delivery_timeout_secs: default_delivery_timeout(),
        }
    }
}

/// Reminder scheduler configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Offset from UTC, in minutes, used to evaluate cron expressions.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl SchedulerConfig {
    /// Zone cron expressions are evaluated in.
    pub fn offset(&self) -> Result<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                LookoutError::Config(format!(
                    "scheduler.utc_offset_minutes out of range: {}",
                    self.utc_offset_minutes
                ))
            })
    }
}

/// Which transport carries notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Discord,
    Webhook,
    #[default]
    Log,
}

/// Delivery transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub mode: DeliveryMode,
    #[serde(default)]
    pub discord_token: String,
    #[serde(default = "default_discord_api_base")]
    pub discord_api_base: String,
    #[serde(default)]
    pub webhook_url: String,
}

fn default_discord_api_base() -> String { "https://discord.com/api/v10".into() }

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::default(),
            discord_token: String::new(),
            discord_api_base: default_discord_api_base(),
            webhook_url: String::new(),
        }
    }
}
