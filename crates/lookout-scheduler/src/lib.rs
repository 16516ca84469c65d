//! # Lookout Scheduler
//!
//! Recurring reminders driven by 5-field cron expressions.
//!
//! ## Architecture
//! ```text
//! JobStore ──load_all / reconcile──► SchedulerEngine
//!                                      ├── #1 "0 8 * * *"   → timer task
//!                                      ├── #2 "*/30 * * * *" → timer task
//!                                      └── on match → Dispatcher (detached)
//! ```
//!
//! Per job id: `Unscheduled → Scheduled` on `schedule`, back on `unschedule`
//! or `stop_all`. Scheduling an already scheduled id replaces its timer.

pub mod cron;
pub mod engine;
pub mod reminders;

pub use cron::{CronSchedule, is_valid_cron_expression, next_run_from_cron};
pub use engine::{LoadReport, SchedulerEngine};
pub use reminders::{create_reminder, delete_reminder, validate_reminder};
