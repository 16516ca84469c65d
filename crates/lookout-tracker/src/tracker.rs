//! The activity tracker: owns the session store and the rule lookups
//! shared by the event ingestor and the alert matcher.

use std::sync::{Arc, Mutex, MutexGuard};

use lookout_core::{Dispatcher, RuleStore};

use crate::session::{Session, SessionKey, SessionStore};

/// Session state plus everything the matcher needs to fire alerts.
pub struct ActivityTracker {
    sessions: Mutex<SessionStore>,
    pub(crate) rules: Arc<dyn RuleStore>,
    pub(crate) dispatcher: Dispatcher,
    /// Held for the whole of a matcher tick; a second tick that cannot take
    /// it is skipped.
    pub(crate) tick_guard: tokio::sync::Mutex<()>,
}

impl ActivityTracker {
    pub fn new(rules: Arc<dyn RuleStore>, dispatcher: Dispatcher) -> Self {
        Self {
            sessions: Mutex::new(SessionStore::new()),
            rules,
            dispatcher,
            tick_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn lock_sessions(&self) -> MutexGuard<'_, SessionStore> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of every tracked session.
    pub fn sessions(&self) -> Vec<(SessionKey, Session)> {
        self.lock_sessions().snapshot()
    }

    pub fn session(&self, key: &SessionKey) -> Option<Session> {
        self.lock_sessions().get(key).cloned()
    }

    /// Forget every session (shutdown).
    pub fn stop(&self) {
        let mut sessions = self.lock_sessions();
        let count = sessions.len();
        sessions.clear();
        tracing::info!("🛑 Activity tracker stopped ({count} session(s) dropped)");
    }
}
