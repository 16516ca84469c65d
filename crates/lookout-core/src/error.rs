//! Lookout error type.

/// Errors surfaced by the Lookout crates.
#[derive(Debug, thiserror::Error)]
pub enum LookoutError {
    #[error("Config error: {0}")]
    Config(String),

    /// Rejected input: malformed cron expression, unknown alert kind, empty ids.
    /// Never persisted, never scheduled.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LookoutError>;
