//! Reminder scheduler: one live cron timer per reminder job.
//!
//! Each scheduled job owns a tokio task that sleeps until the next matching
//! minute and hands the job's message to the dispatcher. `schedule` always
//! replaces: it stops any timer already registered for the id before
//! registering the new one, so an id never has two live timers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, FixedOffset};
use lookout_core::{Clock, Dispatcher, JobId, JobStore, ReminderJob, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cron::CronSchedule;

/// A running timer. Dropping it does not stop it; call [`stop`](Self::stop).
struct TimerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    fn stop(self) {
        self.token.cancel();
        self.task.abort();
    }
}

/// Result of a bulk load.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadReport {
    pub scheduled: usize,
    /// Jobs that could not be scheduled, with the reason.
    pub skipped: Vec<(JobId, String)>,
}

/// Owns every live reminder timer.
pub struct SchedulerEngine {
    timers: Mutex<HashMap<JobId, TimerHandle>>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl SchedulerEngine {
    /// `offset` is the zone cron expressions are evaluated in.
    pub fn new(dispatcher: Dispatcher, clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
            dispatcher,
            clock,
            offset,
        }
    }

    fn lock_timers(&self) -> MutexGuard<'_, HashMap<JobId, TimerHandle>> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// (Re)schedule a job. Any existing timer for the id is stopped first;
    /// an invalid expression leaves the id unscheduled.
    pub fn schedule(&self, job: &ReminderJob) -> Result<()> {
        let mut timers = self.lock_timers();
        if let Some(old) = timers.remove(&job.id) {
            old.stop();
            tracing::debug!("🔁 Reminder #{} rescheduling", job.id);
        }

        let schedule = CronSchedule::parse(&job.cron_expression)?;
        let token = CancellationToken::new();
        let task = tokio::spawn(run_timer(
            job.clone(),
            schedule,
            self.dispatcher.clone(),
            self.clock.clone(),
            self.offset,
            token.clone(),
        ));
        timers.insert(job.id, TimerHandle { token, task });
        tracing::info!("📅 Reminder #{} scheduled: {}", job.id, job.cron_expression);
        Ok(())
    }

    /// Stop the timer for `id`. Returns whether one was live.
    pub fn unschedule(&self, id: JobId) -> bool {
        match self.lock_timers().remove(&id) {
            Some(timer) => {
                timer.stop();
                tracing::info!("🗑️ Reminder #{id} unscheduled");
                true
            }
            None => false,
        }
    }

    /// Schedule every persisted job. A job that fails is logged and skipped;
    /// only a failure to list the jobs is returned as an error.
    pub async fn load_all(&self, store: &dyn JobStore) -> Result<LoadReport> {
        let jobs = store.list_all_jobs().await?;
        tracing::info!("📥 Loading {} reminder(s)...", jobs.len());

        let mut report = LoadReport::default();
        for job in &jobs {
            match self.schedule(job) {
                Ok(()) => report.scheduled += 1,
                Err(e) => {
                    tracing::warn!("⚠️ Reminder #{} skipped: {e}", job.id);
                    report.skipped.push((job.id, e.to_string()));
                }
            }
        }
        tracing::info!("✅ {} reminder(s) active", self.active_count());
        Ok(report)
    }

    /// Bring the live timer set in line with the store: drop timers whose
    /// job is gone, then (re)schedule everything persisted.
    pub async fn reconcile(&self, store: &dyn JobStore) -> Result<LoadReport> {
        let jobs = store.list_all_jobs().await?;
        let stale: Vec<JobId> = self
            .scheduled_ids()
            .into_iter()
            .filter(|id| !jobs.iter().any(|j| j.id == *id))
            .collect();
        for id in stale {
            self.unschedule(id);
        }
        self.load_all(store).await
    }

    /// Stop every live timer. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let mut timers = self.lock_timers();
        let count = timers.len();
        for (id, timer) in timers.drain() {
            timer.stop();
            tracing::debug!("⏹️ Reminder #{id} stopped");
        }
        if count > 0 {
            tracing::info!("🛑 {count} reminder timer(s) stopped");
        }
        count
    }

    pub fn is_scheduled(&self, id: JobId) -> bool {
        self.lock_timers().contains_key(&id)
    }

    pub fn active_count(&self) -> usize {
        self.lock_timers().len()
    }

    pub fn scheduled_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<_> = self.lock_timers().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Drop for SchedulerEngine {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Timer body: sleep to the next match, deliver, repeat.
async fn run_timer(
    job: ReminderJob,
    schedule: CronSchedule,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    token: CancellationToken,
) {
    let mut last_fired: Option<DateTime<FixedOffset>> = None;
    loop {
        let now = clock.now().with_timezone(&offset);
        // A wall clock that lags the timer must not fire the same minute twice.
        let from = match last_fired {
            Some(last) if last > now => last,
            _ => now,
        };
        let Some(next) = schedule.next_after(&from) else {
            tracing::warn!(
                "⚠️ Reminder #{} has no upcoming run for '{}'",
                job.id,
                schedule.expression()
            );
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }
        if token.is_cancelled() {
            return;
        }

        last_fired = Some(next);
        tracing::info!("🔔 Reminder #{} firing for {}", job.id, job.recipient);
        dispatcher.spawn_deliver(job.recipient.clone(), job.message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lookout_core::testing::{MemoryStore, RecordingDelivery, TokioClock};
    use lookout_core::{NewReminderJob, Recipient};
    use std::time::Duration;

    struct Harness {
        engine: SchedulerEngine,
        delivery: Arc<RecordingDelivery>,
        store: MemoryStore,
    }

    impl Harness {
        /// Clock starts at 10:00:30 UTC, so "* * * * *" first fires 30s in.
        fn new() -> Self {
            let delivery = Arc::new(RecordingDelivery::new());
            let dispatcher = Dispatcher::new(delivery.clone(), Duration::from_secs(5));
            let clock = Arc::new(TokioClock::starting_at(
                Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 30).unwrap(),
            ));
            let offset = FixedOffset::east_opt(0).unwrap();
            Self {
                engine: SchedulerEngine::new(dispatcher, clock, offset),
                delivery,
                store: MemoryStore::new(),
            }
        }

        fn job(&self, cron: &str) -> ReminderJob {
            self.store.insert_raw_job(NewReminderJob {
                space_id: Some("g1".into()),
                recipient: Recipient::User("u1".into()),
                message: "drink water".into(),
                cron_expression: cron.into(),
                created_by: "admin".into(),
            })
        }

        fn deliveries(&self) -> usize {
            self.delivery.sent_to(&Recipient::User("u1".into()))
        }
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_on_each_match() {
        let h = Harness::new();
        let job = h.job("* * * * *");
        h.engine.schedule(&job).unwrap();

        advance(29).await;
        assert_eq!(h.deliveries(), 0);
        advance(2).await;
        assert_eq!(h.deliveries(), 1);
        advance(120).await;
        assert_eq!(h.deliveries(), 3);
        assert_eq!(h.delivery.sent()[0].text, "drink water");
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_schedule_keeps_one_timer() {
        let h = Harness::new();
        let job = h.job("* * * * *");
        h.engine.schedule(&job).unwrap();
        h.engine.schedule(&job).unwrap();
        assert_eq!(h.engine.active_count(), 1);

        advance(61).await;
        assert_eq!(h.deliveries(), 1);

        assert!(h.engine.unschedule(job.id));
        assert!(!h.engine.unschedule(job.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unschedule_before_imminent_match() {
        let h = Harness::new();
        let job = h.job("* * * * *");
        h.engine.schedule(&job).unwrap();

        advance(29).await;
        h.engine.unschedule(job.id);
        advance(300).await;
        assert_eq!(h.deliveries(), 0);
        assert!(!h.engine.is_scheduled(job.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_reschedule_leaves_id_unscheduled() {
        let h = Harness::new();
        let mut job = h.job("* * * * *");
        h.engine.schedule(&job).unwrap();

        job.cron_expression = "not a cron".into();
        assert!(h.engine.schedule(&job).is_err());
        assert!(!h.engine.is_scheduled(job.id));

        advance(120).await;
        assert_eq!(h.deliveries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_all_skips_corrupted_job() {
        let h = Harness::new();
        let a = h.job("0 9 * * *");
        let bad = h.job("61 * * * *");
        let c = h.job("*/5 * * * *");

        let report = h.engine.load_all(&h.store).await.unwrap();
        assert_eq!(report.scheduled, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, bad.id);
        assert_eq!(h.engine.scheduled_ids(), vec![a.id, c.id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_drops_deleted_jobs() {
        let h = Harness::new();
        let a = h.job("* * * * *");
        let b = h.job("* * * * *");
        h.engine.load_all(&h.store).await.unwrap();

        h.store.delete_job(a.id).await.unwrap();
        let report = h.engine.reconcile(&h.store).await.unwrap();
        assert_eq!(report.scheduled, 1);
        assert_eq!(h.engine.scheduled_ids(), vec![b.id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_silences_everything() {
        let h = Harness::new();
        h.job("* * * * *");
        h.job("*/2 * * * *");
        h.engine.load_all(&h.store).await.unwrap();

        assert_eq!(h.engine.stop_all(), 2);
        assert_eq!(h.engine.active_count(), 0);
        advance(600).await;
        assert_eq!(h.deliveries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delivery_keeps_timer_alive() {
        let h = Harness::new();
        let job = h.job("* * * * *");
        h.delivery.set_failing(true);
        h.engine.schedule(&job).unwrap();

        advance(31).await;
        assert_eq!(h.deliveries(), 0);

        h.delivery.set_failing(false);
        advance(60).await;
        assert_eq!(h.deliveries(), 1);
        assert!(h.engine.is_scheduled(job.id));
    }
}
