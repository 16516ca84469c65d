//! In-memory collaborators for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{LookoutError, Result};
use crate::traits::{Clock, Delivery, JobStore, RuleStore};
use crate::types::{AlertRule, JobId, NewAlertRule, NewReminderJob, Recipient, ReminderJob, RuleId};

/// One message captured by [`RecordingDelivery`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub recipient: Recipient,
    pub text: String,
}

/// Delivery that records what it was asked to send.
#[derive(Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
    stall: Mutex<Option<Duration>>,
    names: Mutex<HashMap<String, String>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Sleep this long before every send.
    pub fn set_stall(&self, stall: Option<Duration>) {
        *self.stall.lock().unwrap() = stall;
    }

    pub fn set_display_name(&self, user_id: &str, name: &str) {
        self.names
            .lock()
            .unwrap()
            .insert(user_id.to_string(), name.to_string());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient: &Recipient) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| &m.recipient == recipient)
            .count()
    }

    async fn record(&self, recipient: Recipient, text: &str) -> Result<()> {
        let stall = *self.stall.lock().unwrap();
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(LookoutError::Delivery(format!("{recipient} unreachable")));
        }
        self.sent.lock().unwrap().push(SentMessage {
            recipient,
            text: text.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_to_user(&self, user_id: &str, text: &str) -> Result<()> {
        self.record(Recipient::User(user_id.to_string()), text).await
    }

    async fn send_to_channel(&self, channel_id: &str, text: &str) -> Result<()> {
        self.record(Recipient::Channel(channel_id.to_string()), text)
            .await
    }

    async fn display_name(&self, user_id: &str) -> Option<String> {
        self.names.lock().unwrap().get(user_id).cloned()
    }
}

#[derive(Default)]
struct MemoryState {
    rules: Vec<AlertRule>,
    jobs: Vec<ReminderJob>,
    next_rule_id: RuleId,
    next_job_id: JobId,
}

/// Rule and job store kept in a `Vec`.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job as-is, bypassing validation (simulates a corrupted row).
    pub fn insert_raw_job(&self, job: NewReminderJob) -> ReminderJob {
        let mut state = self.state.lock().unwrap();
        state.next_job_id += 1;
        let job = ReminderJob {
            id: state.next_job_id,
            space_id: job.space_id,
            recipient: job.recipient,
            message: job.message,
            cron_expression: job.cron_expression,
            created_by: job.created_by,
            created_at: Utc::now(),
        };
        state.jobs.push(job.clone());
        job
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn create_rule(&self, rule: NewAlertRule) -> Result<AlertRule> {
        rule.validate()?;
        let mut state = self.state.lock().unwrap();
        state.next_rule_id += 1;
        let rule = AlertRule {
            id: state.next_rule_id,
            space_id: rule.space_id,
            target_id: rule.target_id,
            observer_id: rule.observer_id,
            kind: rule.kind,
            threshold_minutes: rule.threshold_minutes,
            message: rule.message,
            enabled: true,
            created_at: Utc::now(),
        };
        state.rules.push(rule.clone());
        Ok(rule)
    }

    async fn get_rule(&self, id: RuleId) -> Result<Option<AlertRule>> {
        let state = self.state.lock().unwrap();
        Ok(state.rules.iter().find(|r| r.id == id).cloned())
    }

    async fn list_rules_by_space(&self, space_id: &str) -> Result<Vec<AlertRule>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rules
            .iter()
            .rev()
            .filter(|r| r.space_id.as_deref() == Some(space_id))
            .cloned()
            .collect())
    }

    async fn list_rules_by_target(
        &self,
        target_id: &str,
        enabled_only: bool,
    ) -> Result<Vec<AlertRule>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rules
            .iter()
            .filter(|r| r.target_id == target_id && (!enabled_only || r.enabled))
            .cloned()
            .collect())
    }

    async fn toggle_rule(&self, id: RuleId, enabled: bool) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        match state.rules.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_rule(&self, id: RuleId) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let len = state.rules.len();
        state.rules.retain(|r| r.id != id);
        Ok(state.rules.len() < len)
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: NewReminderJob) -> Result<ReminderJob> {
        job.validate_fields()?;
        Ok(self.insert_raw_job(job))
    }

    async fn get_job(&self, id: JobId) -> Result<Option<ReminderJob>> {
        let state = self.state.lock().unwrap();
        Ok(state.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn list_jobs_by_space(&self, space_id: &str) -> Result<Vec<ReminderJob>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .jobs
            .iter()
            .rev()
            .filter(|j| j.space_id.as_deref() == Some(space_id))
            .cloned()
            .collect())
    }

    async fn list_all_jobs(&self) -> Result<Vec<ReminderJob>> {
        Ok(self.state.lock().unwrap().jobs.clone())
    }

    async fn delete_job(&self, id: JobId) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let len = state.jobs.len();
        state.jobs.retain(|j| j.id != id);
        Ok(state.jobs.len() < len)
    }
}

/// Wall clock driven by tokio's (pausable) time.
///
/// Under `#[tokio::test(start_paused = true)]` this advances exactly as far
/// as tokio timers do.
pub struct TokioClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.start;
        self.base + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }
}
