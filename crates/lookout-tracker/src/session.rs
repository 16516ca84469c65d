//! In-memory activity sessions, keyed by (space, subject).
//!
//! Each session carries two independent axes. An axis is either inactive
//! (`started_at == None`, empty fired-set) or active since `started_at`, with
//! `fired` holding the rules that already alerted during this period.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use lookout_core::{Axis, RuleId};

/// Identifies one subject inside one space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub space_id: String,
    pub subject_id: String,
}

impl SessionKey {
    pub fn new(space_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            space_id: space_id.into(),
            subject_id: subject_id.into(),
        }
    }
}

/// State of one activity axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisState {
    pub started_at: Option<DateTime<Utc>>,
    pub fired: HashSet<RuleId>,
    /// Game name reported with the latest presence, if any.
    pub activity_name: Option<String>,
}

impl AxisState {
    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    fn start(&mut self, now: DateTime<Utc>, activity_name: Option<String>) {
        self.started_at = Some(now);
        self.fired.clear();
        self.activity_name = activity_name;
    }

    fn stop(&mut self) {
        self.started_at = None;
        self.fired.clear();
        self.activity_name = None;
    }
}

/// Both axes for one (space, subject).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub gaming: AxisState,
    pub voice: AxisState,
}

impl Session {
    pub fn axis(&self, axis: Axis) -> &AxisState {
        match axis {
            Axis::Gaming => &self.gaming,
            Axis::Voice => &self.voice,
        }
    }

    fn axis_mut(&mut self, axis: Axis) -> &mut AxisState {
        match axis {
            Axis::Gaming => &mut self.gaming,
            Axis::Voice => &mut self.voice,
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.gaming.is_active() && !self.voice.is_active()
    }
}

/// What an event did to an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    Stopped,
    Unchanged,
}

/// Owner of every live session.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionKey, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an activity change observed as `was_active → is_active`.
    ///
    /// Only real transitions mutate state. Stopping an axis clears its
    /// fired-set; an entry whose axes are both inactive is dropped.
    pub fn apply(
        &mut self,
        key: &SessionKey,
        axis: Axis,
        was_active: bool,
        is_active: bool,
        now: DateTime<Utc>,
        activity_name: Option<String>,
    ) -> Transition {
        match (was_active, is_active) {
            (false, true) => {
                self.sessions
                    .entry(key.clone())
                    .or_default()
                    .axis_mut(axis)
                    .start(now, activity_name);
                Transition::Started
            }
            (true, false) => {
                if let Some(session) = self.sessions.get_mut(key) {
                    session.axis_mut(axis).stop();
                    if session.is_idle() {
                        self.sessions.remove(key);
                    }
                }
                Transition::Stopped
            }
            (true, true) => {
                // Switching games keeps the session running; only the name moves.
                if activity_name.is_some()
                    && let Some(state) = self.active_axis_mut(key, axis)
                {
                    state.activity_name = activity_name;
                }
                Transition::Unchanged
            }
            (false, false) => Transition::Unchanged,
        }
    }

    fn active_axis_mut(&mut self, key: &SessionKey, axis: Axis) -> Option<&mut AxisState> {
        self.sessions
            .get_mut(key)
            .map(|s| s.axis_mut(axis))
            .filter(|state| state.is_active())
    }

    /// Mark `rule_id` fired on `axis` if the axis has been active for at
    /// least `threshold` and the rule has not fired this period.
    ///
    /// Returns `true` exactly when the caller must send the alert.
    pub fn try_fire(
        &mut self,
        key: &SessionKey,
        axis: Axis,
        rule_id: RuleId,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(state) = self.active_axis_mut(key, axis) else {
            return false;
        };
        let Some(started_at) = state.started_at else {
            return false;
        };
        if now - started_at < threshold || state.fired.contains(&rule_id) {
            return false;
        }
        state.fired.insert(rule_id);
        true
    }

    pub fn get(&self, key: &SessionKey) -> Option<&Session> {
        self.sessions.get(key)
    }

    /// Keys of sessions with at least one active axis, in stable order.
    pub fn active_keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<_> = self
            .sessions
            .iter()
            .filter(|(_, s)| !s.is_idle())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn snapshot(&self) -> Vec<(SessionKey, Session)> {
        let mut all: Vec<_> = self
            .sessions
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}
