//! Rule and job persistence contracts.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AlertRule, JobId, NewAlertRule, NewReminderJob, ReminderJob, RuleId};

/// CRUD over persisted alert rules.
///
/// Rules are immutable once created apart from the `enabled` flag.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn create_rule(&self, rule: NewAlertRule) -> Result<AlertRule>;

    async fn get_rule(&self, id: RuleId) -> Result<Option<AlertRule>>;

    /// Rules scoped to a space, newest first.
    async fn list_rules_by_space(&self, space_id: &str) -> Result<Vec<AlertRule>>;

    /// Rules watching `target_id`, optionally restricted to enabled ones.
    async fn list_rules_by_target(
        &self,
        target_id: &str,
        enabled_only: bool,
    ) -> Result<Vec<AlertRule>>;

    /// Returns `false` when no rule with this id exists.
    async fn toggle_rule(&self, id: RuleId, enabled: bool) -> Result<bool>;

    /// Returns `false` when no rule with this id exists.
    async fn delete_rule(&self, id: RuleId) -> Result<bool>;
}

/// CRUD over persisted reminder jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: NewReminderJob) -> Result<ReminderJob>;

    async fn get_job(&self, id: JobId) -> Result<Option<ReminderJob>>;

    async fn list_jobs_by_space(&self, space_id: &str) -> Result<Vec<ReminderJob>>;

    /// Every persisted job, ordered by id.
    async fn list_all_jobs(&self) -> Result<Vec<ReminderJob>>;

    async fn delete_job(&self, id: JobId) -> Result<bool>;
}
