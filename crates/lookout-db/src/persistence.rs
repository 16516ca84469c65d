//! SQLite-backed persistence for alert rules and reminder jobs.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use lookout_core::{
    AlertKind, AlertRule, JobId, JobStore, LookoutError, NewAlertRule, NewReminderJob, Recipient,
    ReminderJob, Result, RuleId, RuleStore,
};

const RULE_COLUMNS: &str =
    "id, space_id, target_id, observer_id, kind, threshold_minutes, message, enabled, created_at";
const JOB_COLUMNS: &str = "id, space_id, recipient, message, cron_expression, created_by, created_at";

fn store_err(context: &'static str) -> impl FnOnce(rusqlite::Error) -> LookoutError {
    move |e| LookoutError::Store(format!("{context}: {e}"))
}

/// Map a domain parse failure into a rusqlite conversion error for column `idx`.
fn conversion(idx: usize, e: LookoutError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<AlertRule> {
    let kind: String = row.get(4)?;
    let created_at: String = row.get(8)?;
    Ok(AlertRule {
        id: row.get(0)?,
        space_id: row.get(1)?,
        target_id: row.get(2)?,
        observer_id: row.get(3)?,
        kind: kind.parse::<AlertKind>().map_err(|e| conversion(4, e))?,
        threshold_minutes: row.get(5)?,
        message: row.get(6)?,
        enabled: row.get::<_, i32>(7)? != 0,
        created_at: parse_timestamp(&created_at),
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<ReminderJob> {
    let recipient: String = row.get(2)?;
    let created_at: String = row.get(6)?;
    Ok(ReminderJob {
        id: row.get(0)?,
        space_id: row.get(1)?,
        recipient: recipient.parse::<Recipient>().map_err(|e| conversion(2, e))?,
        message: row.get(3)?,
        cron_expression: row.get(4)?,
        created_by: row.get(5)?,
        created_at: parse_timestamp(&created_at),
    })
}

/// Keep the rows that decode. A corrupted row is logged and left out so one
/// bad record never hides the rest of a listing.
fn decodable<T>(rows: impl Iterator<Item = rusqlite::Result<T>>, what: &str) -> Vec<T> {
    rows.filter_map(|row| match row {
        Ok(item) => Some(item),
        Err(e) => {
            tracing::warn!("⚠️ Skipping unreadable {what} row: {e}");
            None
        }
    })
    .collect()
}

/// SQLite-backed store for rules and reminder jobs.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err("DB open"))?;
        // WAL for concurrent readers (CLI alongside a running instance).
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        tracing::debug!("🗄️ Opened database {}", path.display());
        Self::init(conn)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err("DB open"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.lock()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS activity_alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                space_id TEXT,                    -- NULL: created outside any space
                target_id TEXT NOT NULL,          -- the watched user
                observer_id TEXT NOT NULL,        -- who gets notified
                kind TEXT NOT NULL CHECK(kind IN ('gaming', 'voice', 'both')),
                threshold_minutes INTEGER NOT NULL DEFAULT 60 CHECK(threshold_minutes > 0),
                message TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_activity_alerts_space ON activity_alerts(space_id);
            CREATE INDEX IF NOT EXISTS idx_activity_alerts_target ON activity_alerts(target_id);

            CREATE TABLE IF NOT EXISTS reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                space_id TEXT,
                recipient TEXT NOT NULL,          -- user:<id> or channel:<id>
                message TEXT NOT NULL,
                cron_expression TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reminders_space ON reminders(space_id);
         ",
            )
            .map_err(store_err("Migration"))
    }

    fn rule_by_id(conn: &Connection, id: RuleId) -> Result<Option<AlertRule>> {
        conn.query_row(
            &format!("SELECT {RULE_COLUMNS} FROM activity_alerts WHERE id = ?1"),
            [id],
            rule_from_row,
        )
        .optional()
        .map_err(store_err("Load rule"))
    }

    fn job_by_id(conn: &Connection, id: JobId) -> Result<Option<ReminderJob>> {
        conn.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM reminders WHERE id = ?1"),
            [id],
            job_from_row,
        )
        .optional()
        .map_err(store_err("Load reminder"))
    }

    fn query_rules(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<AlertRule>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql).map_err(store_err("List rules"))?;
        let rows = stmt
            .query_map(params, rule_from_row)
            .map_err(store_err("List rules"))?;
        Ok(decodable(rows, "rule"))
    }

    fn query_jobs(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<ReminderJob>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql).map_err(store_err("List reminders"))?;
        let rows = stmt
            .query_map(params, job_from_row)
            .map_err(store_err("List reminders"))?;
        Ok(decodable(rows, "reminder"))
    }
}

#[async_trait]
impl RuleStore for SqliteStore {
    async fn create_rule(&self, rule: NewAlertRule) -> Result<AlertRule> {
        rule.validate()?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO activity_alerts
             (space_id, target_id, observer_id, kind, threshold_minutes, message, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
            params![
                rule.space_id,
                rule.target_id,
                rule.observer_id,
                rule.kind.as_str(),
                rule.threshold_minutes,
                rule.message,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(store_err("Save rule"))?;
        let id = conn.last_insert_rowid();
        Self::rule_by_id(&conn, id)?
            .ok_or_else(|| LookoutError::NotFound(format!("rule #{id} after insert")))
    }

    async fn get_rule(&self, id: RuleId) -> Result<Option<AlertRule>> {
        Self::rule_by_id(&self.lock(), id)
    }

    async fn list_rules_by_space(&self, space_id: &str) -> Result<Vec<AlertRule>> {
        self.query_rules(
            &format!(
                "SELECT {RULE_COLUMNS} FROM activity_alerts WHERE space_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ),
            [space_id],
        )
    }

    async fn list_rules_by_target(
        &self,
        target_id: &str,
        enabled_only: bool,
    ) -> Result<Vec<AlertRule>> {
        let sql = if enabled_only {
            format!("SELECT {RULE_COLUMNS} FROM activity_alerts WHERE target_id = ?1 AND enabled = 1 ORDER BY id")
        } else {
            format!("SELECT {RULE_COLUMNS} FROM activity_alerts WHERE target_id = ?1 ORDER BY id")
        };
        self.query_rules(&sql, [target_id])
    }

    async fn toggle_rule(&self, id: RuleId, enabled: bool) -> Result<bool> {
        let updated = self
            .lock()
            .execute(
                "UPDATE activity_alerts SET enabled = ?1 WHERE id = ?2",
                params![enabled as i32, id],
            )
            .map_err(store_err("Toggle rule"))?;
        Ok(updated > 0)
    }

    async fn delete_rule(&self, id: RuleId) -> Result<bool> {
        let deleted = self
            .lock()
            .execute("DELETE FROM activity_alerts WHERE id = ?1", [id])
            .map_err(store_err("Delete rule"))?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn create_job(&self, job: NewReminderJob) -> Result<ReminderJob> {
        job.validate_fields()?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO reminders
             (space_id, recipient, message, cron_expression, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                job.space_id,
                job.recipient.handle(),
                job.message,
                job.cron_expression,
                job.created_by,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(store_err("Save reminder"))?;
        let id = conn.last_insert_rowid();
        Self::job_by_id(&conn, id)?
            .ok_or_else(|| LookoutError::NotFound(format!("reminder #{id} after insert")))
    }

    async fn get_job(&self, id: JobId) -> Result<Option<ReminderJob>> {
        Self::job_by_id(&self.lock(), id)
    }

    async fn list_jobs_by_space(&self, space_id: &str) -> Result<Vec<ReminderJob>> {
        self.query_jobs(
            &format!(
                "SELECT {JOB_COLUMNS} FROM reminders WHERE space_id = ?1
                 ORDER BY created_at DESC, id DESC"
            ),
            [space_id],
        )
    }

    async fn list_all_jobs(&self) -> Result<Vec<ReminderJob>> {
        self.query_jobs(&format!("SELECT {JOB_COLUMNS} FROM reminders ORDER BY id"), [])
    }

    async fn delete_job(&self, id: JobId) -> Result<bool> {
        let deleted = self
            .lock()
            .execute("DELETE FROM reminders WHERE id = ?1", [id])
            .map_err(store_err("Delete reminder"))?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(target: &str, space: Option<&str>, kind: AlertKind) -> NewAlertRule {
        NewAlertRule {
            space_id: space.map(String::from),
            target_id: target.into(),
            observer_id: "obs".into(),
            kind,
            threshold_minutes: 45,
            message: Some("{user} {type}".into()),
        }
    }

    fn job(space: Option<&str>, cron: &str) -> NewReminderJob {
        NewReminderJob {
            space_id: space.map(String::from),
            recipient: Recipient::Channel("c1".into()),
            message: "hello".into(),
            cron_expression: cron.into(),
            created_by: "admin".into(),
        }
    }

    #[test]
    fn test_open_and_migrate() {
        let dir = std::env::temp_dir().join("lookout-db-test");
        std::fs::create_dir_all(&dir).ok();
        let path = dir.join("test.db");
        std::fs::remove_file(&path).ok();

        let store = SqliteStore::open(&path).unwrap();
        drop(store);
        // Migrations are idempotent.
        SqliteStore::open(&path).unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_rule_crud() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store
            .create_rule(rule("kid", Some("g1"), AlertKind::Both))
            .await
            .unwrap();
        assert!(created.enabled);
        assert_eq!(created.kind, AlertKind::Both);
        assert_eq!(created.threshold_minutes, 45);

        let loaded = store.get_rule(created.id).await.unwrap().unwrap();
        assert_eq!(loaded.target_id, "kid");
        assert_eq!(loaded.message.as_deref(), Some("{user} {type}"));

        assert!(store.toggle_rule(created.id, false).await.unwrap());
        assert!(store.list_rules_by_target("kid", true).await.unwrap().is_empty());
        assert_eq!(store.list_rules_by_target("kid", false).await.unwrap().len(), 1);
        assert!(!store.toggle_rule(999, true).await.unwrap());

        assert!(store.delete_rule(created.id).await.unwrap());
        assert!(!store.delete_rule(created.id).await.unwrap());
        assert!(store.get_rule(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rules_by_space_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.create_rule(rule("a", Some("g1"), AlertKind::Gaming)).await.unwrap();
        let b = store.create_rule(rule("b", Some("g1"), AlertKind::Voice)).await.unwrap();
        store.create_rule(rule("c", Some("g2"), AlertKind::Voice)).await.unwrap();
        store.create_rule(rule("d", None, AlertKind::Voice)).await.unwrap();

        let ids: Vec<_> = store
            .list_rules_by_space("g1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn test_invalid_rule_not_persisted() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut bad = rule("kid", Some("g1"), AlertKind::Gaming);
        bad.threshold_minutes = 0;
        assert!(store.create_rule(bad).await.is_err());
        assert!(store.list_rules_by_target("kid", false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_job_crud() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.create_job(job(Some("g1"), "0 9 * * *")).await.unwrap();
        let b = store.create_job(job(None, "*/5 * * * *")).await.unwrap();
        assert_eq!(a.recipient, Recipient::Channel("c1".into()));

        let all: Vec<_> = store.list_all_jobs().await.unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(all, vec![a.id, b.id]);
        assert_eq!(store.list_jobs_by_space("g1").await.unwrap().len(), 1);

        assert!(store.delete_job(a.id).await.unwrap());
        assert!(store.get_job(a.id).await.unwrap().is_none());
        assert_eq!(store.get_job(b.id).await.unwrap().unwrap().cron_expression, "*/5 * * * *");
    }

    #[tokio::test]
    async fn test_corrupted_rows_are_skipped_in_listings() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.create_job(job(Some("g1"), "0 9 * * *")).await.unwrap();
        let bad = store.create_job(job(Some("g1"), "0 10 * * *")).await.unwrap();
        let c = store.create_job(job(Some("g1"), "0 11 * * *")).await.unwrap();
        store
            .lock()
            .execute(
                "UPDATE reminders SET recipient = 'role:9' WHERE id = ?1",
                [bad.id],
            )
            .unwrap();

        let ids: Vec<_> = store.list_all_jobs().await.unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);
        assert_eq!(store.list_jobs_by_space("g1").await.unwrap().len(), 2);
        assert!(store.get_job(bad.id).await.is_err());

        let voice = store.create_rule(rule("kid", Some("g1"), AlertKind::Voice)).await.unwrap();
        store.create_rule(rule("kid", Some("g1"), AlertKind::Gaming)).await.unwrap();
        // Bypass the CHECK constraint the way an old schema would have.
        store
            .lock()
            .execute_batch("PRAGMA ignore_check_constraints = ON;")
            .unwrap();
        store
            .lock()
            .execute("UPDATE activity_alerts SET kind = 'music' WHERE id = ?1", [voice.id])
            .unwrap();
        assert_eq!(store.list_rules_by_target("kid", false).await.unwrap().len(), 1);
    }
}
