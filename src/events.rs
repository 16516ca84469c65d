//! Inbound event feed: newline-delimited JSON from the platform adapter.
//!
//! ```text
//! {"type":"activity","space_id":"g1","subject_id":"u1","axis":"gaming","was_active":false,"is_active":true,"activity_name":"Tetris"}
//! {"type":"reminders_changed"}
//! ```

use std::sync::Arc;

use lookout_core::{Clock, JobStore};
use lookout_scheduler::SchedulerEngine;
use lookout_tracker::{ActivityEvent, ActivityTracker};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

/// One line of the feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Activity(ActivityEvent),
    /// Reminders were added or removed by another process.
    RemindersChanged,
}

/// Parse one feed line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<serde_json::Result<InboundEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Live components an event can touch.
pub struct EventRouter {
    pub tracker: Arc<ActivityTracker>,
    pub engine: Arc<SchedulerEngine>,
    pub jobs: Arc<dyn JobStore>,
    pub clock: Arc<dyn Clock>,
}

impl EventRouter {
    pub async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::Activity(event) => {
                self.tracker.on_activity_event(&event, self.clock.now());
            }
            InboundEvent::RemindersChanged => match self.engine.reconcile(&*self.jobs).await {
                Ok(report) => tracing::info!(
                    "🔄 Reminders reconciled: {} active, {} skipped",
                    report.scheduled,
                    report.skipped.len()
                ),
                Err(e) => tracing::warn!("⚠️ Reminder reconciliation failed: {e}"),
            },
        }
    }

    /// Consume `reader` until EOF or `shutdown`. Returns how many events
    /// were applied; malformed lines are logged and skipped.
    pub async fn consume<R>(&self, reader: R, shutdown: CancellationToken) -> usize
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut applied = 0;
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::info!("📭 Event feed closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!("⚠️ Event feed read error: {e}");
                    break;
                }
            };
            match parse_line(&line) {
                None => {}
                Some(Ok(event)) => {
                    self.handle(event).await;
                    applied += 1;
                }
                Some(Err(e)) => tracing::warn!("⚠️ Skipping malformed event: {e}"),
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone, Utc};
    use lookout_core::testing::{MemoryStore, RecordingDelivery, TokioClock};
    use lookout_core::{Axis, Dispatcher, NewReminderJob, Recipient};
    use lookout_tracker::SessionKey;
    use std::time::Duration;

    fn router(store: Arc<MemoryStore>) -> EventRouter {
        let dispatcher = Dispatcher::new(Arc::new(RecordingDelivery::new()), Duration::from_secs(5));
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::starting_at(
            Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap(),
        ));
        let engine = SchedulerEngine::new(
            dispatcher.clone(),
            clock.clone(),
            FixedOffset::east_opt(0).unwrap(),
        );
        EventRouter {
            tracker: Arc::new(ActivityTracker::new(store.clone(), dispatcher)),
            engine: Arc::new(engine),
            jobs: store,
            clock,
        }
    }

    #[test]
    fn test_parse_line_variants() {
        let event = parse_line(
            r#"{"type":"activity","space_id":"g1","subject_id":"u1","axis":"voice","was_active":false,"is_active":true}"#,
        )
        .unwrap()
        .unwrap();
        match event {
            InboundEvent::Activity(e) => {
                assert_eq!(e.axis, Axis::Voice);
                assert!(e.activity_name.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(
            parse_line(r#" {"type":"reminders_changed"} "#).unwrap().unwrap(),
            InboundEvent::RemindersChanged
        );
        assert!(parse_line("   ").is_none());
        assert!(parse_line(r#"{"type":"nope"}"#).unwrap().is_err());
        assert!(parse_line("not json").unwrap().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_applies_events_and_skips_garbage() {
        let store = Arc::new(MemoryStore::new());
        let router = router(store.clone());
        let feed = concat!(
            r#"{"type":"activity","space_id":"g1","subject_id":"u1","axis":"gaming","was_active":false,"is_active":true,"activity_name":"Tetris"}"#,
            "\n",
            "garbage\n",
            "\n",
            r#"{"type":"activity","space_id":"g1","subject_id":"u2","axis":"voice","was_active":false,"is_active":true}"#,
            "\n",
        );

        let applied = router.consume(feed.as_bytes(), CancellationToken::new()).await;
        assert_eq!(applied, 2);

        let session = router.tracker.session(&SessionKey::new("g1", "u1")).unwrap();
        assert_eq!(session.gaming.activity_name.as_deref(), Some("Tetris"));
        assert!(router.tracker.session(&SessionKey::new("g1", "u2")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reminders_changed_reconciles() {
        let store = Arc::new(MemoryStore::new());
        let router = router(store.clone());
        let job = store.insert_raw_job(NewReminderJob {
            space_id: Some("g1".into()),
            recipient: Recipient::Channel("c1".into()),
            message: "stand-up".into(),
            cron_expression: "0 9 * * 1-5".into(),
            created_by: "admin".into(),
        });

        router.handle(InboundEvent::RemindersChanged).await;
        assert_eq!(router.engine.scheduled_ids(), vec![job.id]);

        store.delete_job(job.id).await.unwrap();
        router.handle(InboundEvent::RemindersChanged).await;
        assert_eq!(router.engine.active_count(), 0);
    }

    #[tokio::test]
    async fn test_corrupted_reminder_row_does_not_block_loading() {
        use lookout_db::SqliteStore;

        let dir = std::env::temp_dir().join(format!("lookout-load-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("reminders.db");
        std::fs::remove_file(&path).ok();

        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let job = |cron: &str| NewReminderJob {
            space_id: Some("g1".into()),
            recipient: Recipient::User("u1".into()),
            message: "homework".into(),
            cron_expression: cron.into(),
            created_by: "parent".into(),
        };
        let a = store.create_job(job("0 9 * * *")).await.unwrap();
        let bad = store.create_job(job("0 10 * * *")).await.unwrap();
        let c = store.create_job(job("0 11 * * *")).await.unwrap();
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute("UPDATE reminders SET recipient = 'role:9' WHERE id = ?1", [bad.id])
            .unwrap();

        let dispatcher = Dispatcher::new(Arc::new(RecordingDelivery::new()), Duration::from_secs(5));
        let engine = SchedulerEngine::new(
            dispatcher,
            Arc::new(lookout_core::SystemClock),
            FixedOffset::east_opt(0).unwrap(),
        );
        let report = engine.load_all(&*store).await.unwrap();
        assert_eq!(report.scheduled, 2);
        assert_eq!(engine.scheduled_ids(), vec![a.id, c.id]);

        engine.stop_all();
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_consume_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let router = router(store);
        let (_writer, reader) = tokio::io::duplex(64);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let applied = router
            .consume(tokio::io::BufReader::new(reader), shutdown)
            .await;
        assert_eq!(applied, 0);
    }
}
