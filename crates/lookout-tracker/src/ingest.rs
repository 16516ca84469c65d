//! Event ingestor: turns presence / voice-membership changes into session
//! transitions.

use chrono::{DateTime, Utc};
use lookout_core::Axis;
use serde::{Deserialize, Serialize};

use crate::session::{SessionKey, Transition};
use crate::tracker::ActivityTracker;

/// An observed activity change for one subject in one space.
///
/// `was_active` / `is_active` are derived by the source from the state before
/// and after the change (e.g. "had a Playing activity", "had a voice channel").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub space_id: String,
    pub subject_id: String,
    pub axis: Axis,
    pub was_active: bool,
    pub is_active: bool,
    /// Game name for gaming events.
    #[serde(default)]
    pub activity_name: Option<String>,
}

impl ActivityEvent {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.space_id.clone(), self.subject_id.clone())
    }
}

impl ActivityTracker {
    /// Single entry point for activity changes. No I/O.
    pub fn on_activity_event(&self, event: &ActivityEvent, now: DateTime<Utc>) -> Transition {
        let transition = self.lock_sessions().apply(
            &event.key(),
            event.axis,
            event.was_active,
            event.is_active,
            now,
            event.activity_name.clone(),
        );
        match transition {
            Transition::Started => tracing::debug!(
                "▶️ {} started {} in {}",
                event.subject_id,
                event.axis,
                event.space_id
            ),
            Transition::Stopped => tracing::debug!(
                "⏹️ {} stopped {} in {}",
                event.subject_id,
                event.axis,
                event.space_id
            ),
            Transition::Unchanged => {}
        }
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_core::testing::{MemoryStore, RecordingDelivery};
    use lookout_core::Dispatcher;
    use std::sync::Arc;
    use std::time::Duration;

    fn tracker() -> ActivityTracker {
        let dispatcher = Dispatcher::new(Arc::new(RecordingDelivery::new()), Duration::from_secs(5));
        ActivityTracker::new(Arc::new(MemoryStore::new()), dispatcher)
    }

    #[test]
    fn test_event_json_shape() {
        let event: ActivityEvent = serde_json::from_str(
            r#"{"space_id":"g1","subject_id":"u1","axis":"voice","was_active":false,"is_active":true}"#,
        )
        .unwrap();
        assert_eq!(event.axis, Axis::Voice);
        assert!(event.activity_name.is_none());
    }

    #[test]
    fn test_events_drive_sessions() {
        let tracker = tracker();
        let now = Utc::now();
        let mut event = ActivityEvent {
            space_id: "g1".into(),
            subject_id: "u1".into(),
            axis: Axis::Gaming,
            was_active: false,
            is_active: true,
            activity_name: Some("Chess".into()),
        };
        assert_eq!(tracker.on_activity_event(&event, now), Transition::Started);
        let session = tracker.session(&event.key()).unwrap();
        assert_eq!(session.gaming.started_at, Some(now));
        assert!(!session.voice.is_active());

        event.was_active = true;
        event.is_active = false;
        assert_eq!(tracker.on_activity_event(&event, now), Transition::Stopped);
        assert!(tracker.sessions().is_empty());
    }

    #[test]
    fn test_stop_clears_everything() {
        let tracker = tracker();
        let event = ActivityEvent {
            space_id: "g1".into(),
            subject_id: "u1".into(),
            axis: Axis::Voice,
            was_active: false,
            is_active: true,
            activity_name: None,
        };
        tracker.on_activity_event(&event, Utc::now());
        tracker.stop();
        assert!(tracker.sessions().is_empty());
    }
}
