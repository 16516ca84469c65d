//! Alert rule matcher: the periodic scan that decides when a session has
//! run long enough to notify someone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lookout_core::notify::ActivityAlert;
use lookout_core::{AlertRule, Axis, Clock, RuleId};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::session::SessionKey;
use crate::tracker::ActivityTracker;

/// An alert decided during a tick. The delivery runs detached.
#[derive(Debug)]
pub struct FiredAlert {
    pub rule_id: RuleId,
    pub axis: Axis,
    pub key: SessionKey,
    /// Resolves to `true` when the transport accepted the message.
    pub delivery: JoinHandle<bool>,
}

#[derive(Debug)]
pub enum TickOutcome {
    /// Another tick was still running.
    Skipped,
    Completed(Vec<FiredAlert>),
}

impl TickOutcome {
    pub fn fired(self) -> Vec<FiredAlert> {
        match self {
            TickOutcome::Skipped => Vec::new(),
            TickOutcome::Completed(fired) => fired,
        }
    }
}

impl ActivityTracker {
    /// Evaluate every active session against its rules at `now`.
    ///
    /// Rules are fetched before the session lock is taken; the
    /// check-and-mark for a session happens under a single lock, so a rule
    /// is marked fired before its alert leaves this function. The rule stays
    /// marked even if the delivery later fails.
    ///
    /// A disabled rule whose threshold is crossed is marked without sending,
    /// so re-enabling it later in the same period does not fire late.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickOutcome {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            tracing::debug!("⏭️ Matcher tick skipped, previous tick still running");
            return TickOutcome::Skipped;
        };

        let keys = self.lock_sessions().active_keys();
        let mut rules_by_subject: HashMap<String, Vec<AlertRule>> = HashMap::new();
        let mut fired = Vec::new();

        for key in keys {
            if !rules_by_subject.contains_key(&key.subject_id) {
                match self.rules.list_rules_by_target(&key.subject_id, false).await {
                    Ok(rules) => {
                        rules_by_subject.insert(key.subject_id.clone(), rules);
                    }
                    Err(e) => {
                        tracing::warn!("⚠️ Failed to load rules for {}: {e}", key.subject_id);
                        continue;
                    }
                }
            }
            let Some(rules) = rules_by_subject.get(&key.subject_id) else {
                continue;
            };

            for alert in self.decide(&key, rules, now) {
                tracing::info!(
                    "⏰ Rule #{} reached {} min for {} ({}) in {}",
                    alert.rule_id,
                    alert.threshold_minutes,
                    key.subject_id,
                    alert.axis,
                    key.space_id
                );
                fired.push(FiredAlert {
                    rule_id: alert.rule_id,
                    axis: alert.axis,
                    key: key.clone(),
                    delivery: self.dispatcher.spawn_alert(alert),
                });
            }
        }

        TickOutcome::Completed(fired)
    }

    /// Check-and-mark for one session. Rules without a space never match:
    /// sessions are only tracked per space.
    fn decide(&self, key: &SessionKey, rules: &[AlertRule], now: DateTime<Utc>) -> Vec<ActivityAlert> {
        let mut sessions = self.lock_sessions();
        let mut alerts = Vec::new();
        for rule in rules
            .iter()
            .filter(|r| r.space_id.as_deref() == Some(key.space_id.as_str()))
        {
            for axis in Axis::ALL {
                if !rule.kind.covers(axis)
                    || !sessions.try_fire(key, axis, rule.id, rule.threshold(), now)
                {
                    continue;
                }
                if !rule.enabled {
                    tracing::debug!("🔕 Rule #{} is disabled, {} alert suppressed", rule.id, axis);
                    continue;
                }
                let activity_name = sessions
                    .get(key)
                    .and_then(|s| s.axis(axis).activity_name.clone());
                alerts.push(ActivityAlert {
                    rule_id: rule.id,
                    observer_id: rule.observer_id.clone(),
                    target_id: rule.target_id.clone(),
                    space_id: rule.space_id.clone(),
                    axis,
                    threshold_minutes: rule.threshold_minutes,
                    template: rule.message.clone(),
                    activity_name,
                });
            }
        }
        alerts
    }
}

/// Spawn the matcher loop. Ticks every `every` until `shutdown` is cancelled.
pub fn spawn_matcher(
    tracker: Arc<ActivityTracker>,
    clock: Arc<dyn Clock>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("⏰ Activity matcher started (check every {}s)", every.as_secs());
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the first scan happens one period in.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let fired = tracker.tick(clock.now()).await.fired();
                    if !fired.is_empty() {
                        tracing::debug!("📣 {} alert(s) dispatched", fired.len());
                    }
                }
            }
        }
        tracing::info!("🛑 Activity matcher stopped");
    })
}
