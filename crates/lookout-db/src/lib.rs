//! # Lookout DB
//!
//! SQLite-backed [`RuleStore`](lookout_core::RuleStore) and
//! [`JobStore`](lookout_core::JobStore). Two tables: `activity_alerts` and
//! `reminders`.

pub mod persistence;

pub use persistence::SqliteStore;
