//! # Lookout Core
//!
//! Shared building blocks for the activity tracker and the reminder scheduler:
//! domain types, the collaborator traits (stores, delivery, clock), the
//! configuration file and the notification dispatcher.
//!
//! ```text
//! presence/voice events ──► tracker ──► RuleStore ─┐
//!                                                   ├──► Dispatcher ──► Delivery
//! cron timers ──────────► scheduler ──► JobStore ──┘
//! ```

pub mod config;
pub mod error;
pub mod notify;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::LookoutConfig;
pub use error::{LookoutError, Result};
pub use notify::Dispatcher;
pub use traits::{Clock, Delivery, JobStore, RuleStore, SystemClock};
pub use types::{
    AlertKind, AlertRule, Axis, JobId, NewAlertRule, NewReminderJob, Recipient, ReminderJob,
    RuleId,
};
