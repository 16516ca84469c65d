//! # Lookout Tracker
//!
//! Watches per-user activity (playing a game, sitting in voice) and tells an
//! observer once a session outlasts a configured threshold.
//!
//! ## Architecture
//! ```text
//! ActivityEvent (was_active → is_active)
//!   └── ActivityTracker::on_activity_event → SessionStore transition
//!
//! spawn_matcher (tokio interval)
//!   └── ActivityTracker::tick
//!         ├── enabled rules for each active subject (RuleStore)
//!         ├── elapsed ≥ threshold and not yet fired → mark fired
//!         └── Dispatcher::spawn_alert (detached)
//! ```
//!
//! A rule fires at most once per continuous activity period per axis;
//! leaving and re-entering an activity re-arms every rule.

pub mod ingest;
pub mod matcher;
pub mod session;
pub mod tracker;

pub use ingest::ActivityEvent;
pub use matcher::{FiredAlert, TickOutcome, spawn_matcher};
pub use session::{AxisState, Session, SessionKey, SessionStore, Transition};
pub use tracker::ActivityTracker;
