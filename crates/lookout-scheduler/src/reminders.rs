//! Reminder lifecycle: validate → persist → schedule, and the reverse.

use lookout_core::{JobId, JobStore, NewReminderJob, ReminderJob, Result};

use crate::cron::CronSchedule;
use crate::engine::SchedulerEngine;

/// Check a reminder before it is persisted: required fields and a
/// parseable cron expression.
pub fn validate_reminder(new: &NewReminderJob) -> Result<()> {
    new.validate_fields()?;
    CronSchedule::parse(&new.cron_expression)?;
    Ok(())
}

/// Create a reminder. Invalid input is rejected before anything is stored.
pub async fn create_reminder(
    store: &dyn JobStore,
    engine: &SchedulerEngine,
    new: NewReminderJob,
) -> Result<ReminderJob> {
    validate_reminder(&new)?;

    let job = store.create_job(new).await?;
    if let Err(e) = engine.schedule(&job) {
        tracing::warn!("⚠️ Reminder #{} stored but not scheduled: {e}", job.id);
    }
    Ok(job)
}

/// Delete a reminder and stop its timer. Returns whether it existed.
pub async fn delete_reminder(store: &dyn JobStore, engine: &SchedulerEngine, id: JobId) -> Result<bool> {
    engine.unschedule(id);
    store.delete_job(id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone, Utc};
    use lookout_core::testing::{MemoryStore, RecordingDelivery, TokioClock};
    use lookout_core::{Dispatcher, LookoutError, Recipient};
    use std::sync::Arc;
    use std::time::Duration;

    fn engine(delivery: Arc<RecordingDelivery>) -> SchedulerEngine {
        let dispatcher = Dispatcher::new(delivery, Duration::from_secs(5));
        let clock = Arc::new(TokioClock::starting_at(
            Utc.with_ymd_and_hms(2026, 3, 1, 8, 59, 0).unwrap(),
        ));
        SchedulerEngine::new(dispatcher, clock, FixedOffset::east_opt(0).unwrap())
    }

    fn new_job(cron: &str) -> NewReminderJob {
        NewReminderJob {
            space_id: Some("g1".into()),
            recipient: Recipient::Channel("general".into()),
            message: "standup".into(),
            cron_expression: cron.into(),
            created_by: "lead".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_validates_before_persisting() {
        let store = MemoryStore::new();
        let engine = engine(Arc::new(RecordingDelivery::new()));

        let err = create_reminder(&store, &engine, new_job("99 * * * *")).await.unwrap_err();
        assert!(matches!(err, LookoutError::Validation(_)));
        assert!(store.list_all_jobs().await.unwrap().is_empty());
        assert_eq!(engine.active_count(), 0);

        let mut empty = new_job("0 9 * * *");
        empty.message = "  ".into();
        assert!(create_reminder(&store, &engine, empty).await.is_err());
        assert!(store.list_all_jobs().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_schedules_and_delete_silences() {
        let store = MemoryStore::new();
        let delivery = Arc::new(RecordingDelivery::new());
        let engine = engine(delivery.clone());

        let job = create_reminder(&store, &engine, new_job("0 9 * * *")).await.unwrap();
        assert!(engine.is_scheduled(job.id));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(delivery.sent_to(&Recipient::Channel("general".into())), 1);

        assert!(delete_reminder(&store, &engine, job.id).await.unwrap());
        assert!(!engine.is_scheduled(job.id));
        assert!(!delete_reminder(&store, &engine, job.id).await.unwrap());

        tokio::time::sleep(Duration::from_secs(2 * 86_400)).await;
        assert_eq!(delivery.sent_to(&Recipient::Channel("general".into())), 1);
    }
}
