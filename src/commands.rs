//! One-shot CLI commands: rule and reminder CRUD, cron preview.
//!
//! A running `lookout run` picks up reminder changes on the next
//! `reminders_changed` event; rule changes are read on every matcher tick.

use anyhow::{Result, bail};
use chrono::{DateTime, FixedOffset, Utc};
use lookout_core::{
    AlertKind, AlertRule, JobId, JobStore, NewAlertRule, NewReminderJob, Recipient, ReminderJob,
    RuleId, RuleStore,
};
use lookout_scheduler::{CronSchedule, validate_reminder};

pub async fn add_alert(store: &dyn RuleStore, rule: NewAlertRule) -> Result<AlertRule> {
    let rule = store.create_rule(rule).await?;
    tracing::info!("🔔 Alert #{} created for {}", rule.id, rule.target_id);
    Ok(rule)
}

/// Rules of a space, or every rule watching a target.
pub async fn list_alerts(
    store: &dyn RuleStore,
    space_id: Option<&str>,
    target_id: Option<&str>,
) -> Result<Vec<AlertRule>> {
    match (space_id, target_id) {
        (Some(space), _) => Ok(store.list_rules_by_space(space).await?),
        (None, Some(target)) => Ok(store.list_rules_by_target(target, false).await?),
        (None, None) => bail!("either --space or --target is required"),
    }
}

pub async fn toggle_alert(store: &dyn RuleStore, id: RuleId, enabled: bool) -> Result<()> {
    if !store.toggle_rule(id, enabled).await? {
        bail!("alert #{id} not found");
    }
    Ok(())
}

pub async fn delete_alert(store: &dyn RuleStore, id: RuleId) -> Result<()> {
    if !store.delete_rule(id).await? {
        bail!("alert #{id} not found");
    }
    Ok(())
}

/// Persist a reminder after the same checks the scheduler applies.
pub async fn add_reminder(store: &dyn JobStore, job: NewReminderJob) -> Result<ReminderJob> {
    validate_reminder(&job)?;
    let job = store.create_job(job).await?;
    tracing::info!("📅 Reminder #{} created: {}", job.id, job.cron_expression);
    Ok(job)
}

pub async fn list_reminders(store: &dyn JobStore, space_id: Option<&str>) -> Result<Vec<ReminderJob>> {
    Ok(match space_id {
        Some(space) => store.list_jobs_by_space(space).await?,
        None => store.list_all_jobs().await?,
    })
}

pub async fn delete_reminder(store: &dyn JobStore, id: JobId) -> Result<()> {
    if !store.delete_job(id).await? {
        bail!("reminder #{id} not found");
    }
    Ok(())
}

/// Next `count` fire times of `expression`, evaluated in `offset`.
pub fn cron_next(
    expression: &str,
    count: usize,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Result<Vec<DateTime<FixedOffset>>> {
    let schedule = CronSchedule::parse(expression)?;
    Ok(schedule.upcoming(&now.with_timezone(&offset), count))
}

pub fn format_rule(rule: &AlertRule) -> String {
    let state = if rule.enabled { "on " } else { "off" };
    let kind = match rule.kind {
        AlertKind::Gaming => "🎮",
        AlertKind::Voice => "🎙️",
        AlertKind::Both => "🎮🎙️",
    };
    format!(
        "#{:<4} [{state}] {kind} {} → {} after {} min{}",
        rule.id,
        rule.target_id,
        rule.observer_id,
        rule.threshold_minutes,
        rule.message
            .as_deref()
            .map(|m| format!(" \"{m}\""))
            .unwrap_or_default()
    )
}

pub fn format_reminder(job: &ReminderJob) -> String {
    let to = match &job.recipient {
        Recipient::User(id) => format!("@{id}"),
        Recipient::Channel(id) => format!("#{id}"),
    };
    format!(
        "#{:<4} {:<16} → {to}: {}",
        job.id, job.cron_expression, job.message
    )
}
