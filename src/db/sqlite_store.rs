//! SQLite event log store
//!
//! Canonical backend. Schema setup runs from `init()` and is additive-only:
//! the base `CREATE TABLE` statements reflect the original schema, then
//! later columns (`org_id` on the log table, `sim_run_id` on the event
//! table) are added with `ALTER TABLE`, tolerating "duplicate column name"
//! so repeated startups on a migrated store are no-ops. Schema changes
//! assume a single writer process at a time.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::db::store::EventLogStore;
use crate::db::DbPool;
use crate::models::{ApprovalEvent, ApprovalEventFilter, ApprovalEventType, LogEntry};
use crate::utils::{StoreError, StoreResult};

pub struct SqliteEventStore {
    pool: DbPool,
    initialized: AtomicBool,
}

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    instance_id: String,
    service: String,
    level: String,
    message: String,
    username: String,
    event_time: String,
    created_at: String,
    org_id: String,
}

#[derive(Debug, sqlx::FromRow)]
struct ApprovalRow {
    event_id: String,
    org_id: String,
    agent_name: String,
    decision_point_id: String,
    event_type: String,
    created_at: String,
    sim_run_id: Option<String>,
    payload: String,
}

const LOG_COLUMNS: &str =
    "instance_id, service, level, message, username, event_time, created_at, org_id";

const APPROVAL_COLUMNS: &str =
    "event_id, org_id, agent_name, decision_point_id, event_type, created_at, sim_run_id, payload";

impl SqliteEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn ensure_init(&self) -> StoreResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Add a column introduced after the base schema, ignoring the error a
    /// second run produces on an already-migrated store.
    async fn add_column_if_missing(&self, ddl: &str) -> StoreResult<()> {
        match sqlx::query(ddl).execute(&self.pool).await {
            Ok(_) => {
                info!(ddl, "Applied additive migration");
                Ok(())
            }
            Err(e) if e.to_string().contains("duplicate column name") => {
                debug!(ddl, "Column already present, skipping migration");
                Ok(())
            }
            Err(e) => Err(StoreError::write(e)),
        }
    }
}

#[async_trait::async_trait]
impl EventLogStore for SqliteEventStore {
    async fn init(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agent_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instance_id TEXT NOT NULL,
                service TEXT NOT NULL DEFAULT '',
                level TEXT NOT NULL DEFAULT '',
                message TEXT NOT NULL DEFAULT '',
                username TEXT NOT NULL,
                event_time TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::write)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS approval_events (
                event_id TEXT PRIMARY KEY,
                org_id TEXT NOT NULL,
                agent_name TEXT NOT NULL,
                decision_point_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                payload TEXT NOT NULL,
                UNIQUE (org_id, agent_name, decision_point_id, event_type)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::write)?;

        // Columns introduced after the base schema shipped
        self.add_column_if_missing("ALTER TABLE agent_logs ADD COLUMN org_id TEXT NOT NULL DEFAULT ''")
            .await?;
        self.add_column_if_missing("ALTER TABLE approval_events ADD COLUMN sim_run_id TEXT")
            .await?;

        // One index per supported filter shape, so no query falls back to
        // a full scan
        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_agent_logs_instance_time \
             ON agent_logs (instance_id, event_time)",
            "CREATE INDEX IF NOT EXISTS idx_agent_logs_org_instance_time \
             ON agent_logs (org_id, instance_id, event_time)",
            "CREATE INDEX IF NOT EXISTS idx_approval_org_agent_created \
             ON approval_events (org_id, agent_name, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_approval_decision_point \
             ON approval_events (org_id, agent_name, decision_point_id)",
            "CREATE INDEX IF NOT EXISTS idx_approval_type_created \
             ON approval_events (org_id, agent_name, event_type, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_approval_sim_run \
             ON approval_events (org_id, agent_name, sim_run_id, event_type, created_at)",
        ] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(StoreError::write)?;
        }

        self.initialized.store(true, Ordering::Release);
        debug!("SQLite event store initialized");
        Ok(())
    }

    async fn append_log_entry(&self, entry: &LogEntry) -> StoreResult<()> {
        self.ensure_init()?;

        sqlx::query(
            r#"
            INSERT INTO agent_logs
                (instance_id, service, level, message, username, event_time, created_at, org_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.instance_id)
        .bind(&entry.service)
        .bind(&entry.level)
        .bind(&entry.message)
        .bind(&entry.username)
        .bind(fmt_timestamp(entry.event_time))
        .bind(fmt_timestamp(entry.created_at))
        .bind(&entry.org_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::write)?;

        Ok(())
    }

    async fn list_log_entries(&self, instance_id: &str) -> StoreResult<Vec<LogEntry>> {
        self.ensure_init()?;

        let rows = sqlx::query_as::<_, LogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM agent_logs WHERE instance_id = ? \
             ORDER BY event_time ASC, id ASC"
        ))
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query)?;

        Ok(rows.into_iter().map(row_to_log_entry).collect())
    }

    async fn insert_approval_event(&self, event: &ApprovalEvent) -> StoreResult<bool> {
        self.ensure_init()?;

        // Single atomic statement: a concurrent caller racing on the same
        // idempotency key loses cleanly instead of erroring. Never
        // read-then-write.
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO approval_events
                (event_id, org_id, agent_name, decision_point_id, event_type,
                 created_at, sim_run_id, payload)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.org_id)
        .bind(&event.agent_name)
        .bind(&event.decision_point_id)
        .bind(event.event_type.as_str())
        .bind(fmt_timestamp(event.created_at))
        .bind(&event.sim_run_id)
        .bind(event.payload.to_string())
        .execute(&self.pool)
        .await
        .map_err(StoreError::write)?;

        let created = result.rows_affected() > 0;
        if !created {
            debug!(
                org_id = %event.org_id,
                agent = %event.agent_name,
                decision_point = %event.decision_point_id,
                event_type = event.event_type.as_str(),
                "Duplicate approval event ignored"
            );
        }
        Ok(created)
    }

    async fn approval_events_for_decision_point(
        &self,
        org_id: &str,
        agent_name: &str,
        decision_point_id: &str,
    ) -> StoreResult<Vec<ApprovalEvent>> {
        self.ensure_init()?;

        let rows = sqlx::query_as::<_, ApprovalRow>(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM approval_events \
             WHERE org_id = ? AND agent_name = ? AND decision_point_id = ? \
             ORDER BY created_at ASC, event_id ASC"
        ))
        .bind(org_id)
        .bind(agent_name)
        .bind(decision_point_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query)?;

        Ok(rows.into_iter().filter_map(row_to_approval_event).collect())
    }

    async fn approval_request_payload(
        &self,
        org_id: &str,
        agent_name: &str,
        decision_point_id: &str,
    ) -> StoreResult<Option<serde_json::Value>> {
        self.ensure_init()?;

        let row = sqlx::query(
            "SELECT payload FROM approval_events \
             WHERE org_id = ? AND agent_name = ? AND decision_point_id = ? \
               AND event_type = 'approval_request' \
             ORDER BY created_at ASC, event_id ASC LIMIT 1",
        )
        .bind(org_id)
        .bind(agent_name)
        .bind(decision_point_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::query)?;

        Ok(row.and_then(|r| {
            let raw: String = r.get("payload");
            match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(
                        org_id,
                        agent_name, decision_point_id, "Malformed stored payload, returning none"
                    );
                    None
                }
            }
        }))
    }

    async fn query_approval_events(
        &self,
        filter: &ApprovalEventFilter,
    ) -> StoreResult<Vec<ApprovalEvent>> {
        self.ensure_init()?;

        let mut sql = format!(
            "SELECT {APPROVAL_COLUMNS} FROM approval_events \
             WHERE org_id = ? AND agent_name = ?"
        );

        if filter.event_type.is_some() {
            sql.push_str(" AND event_type = ?");
        }
        if filter.sim_run_id.is_some() {
            sql.push_str(" AND sim_run_id = ?");
        }
        if filter.start.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        if filter.end.is_some() {
            sql.push_str(" AND created_at <= ?");
        }

        sql.push_str(" ORDER BY created_at ASC, event_id ASC LIMIT ? OFFSET ?");

        let mut q = sqlx::query_as::<_, ApprovalRow>(&sql)
            .bind(&filter.org_id)
            .bind(&filter.agent_name);
        if let Some(event_type) = filter.event_type {
            q = q.bind(event_type.as_str());
        }
        if let Some(ref sim_run_id) = filter.sim_run_id {
            q = q.bind(sim_run_id);
        }
        if let Some(start) = filter.start {
            q = q.bind(fmt_timestamp(start));
        }
        if let Some(end) = filter.end {
            q = q.bind(fmt_timestamp(end));
        }
        // LIMIT -1 means unbounded in SQLite
        q = q
            .bind(filter.limit.map(|l| l as i64).unwrap_or(-1))
            .bind(filter.offset.map(|o| o as i64).unwrap_or(0));

        let rows = q.fetch_all(&self.pool).await.map_err(StoreError::query)?;

        Ok(rows.into_iter().filter_map(row_to_approval_event).collect())
    }
}

/// Fixed-width RFC 3339 in UTC, so lexicographic order in SQLite equals
/// chronological order.
fn fmt_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_db_timestamp(ts: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S") {
        return DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc);
    }
    Utc::now()
}

fn row_to_log_entry(row: LogRow) -> LogEntry {
    LogEntry {
        instance_id: row.instance_id,
        service: row.service,
        level: row.level,
        message: row.message,
        username: row.username,
        event_time: parse_db_timestamp(&row.event_time),
        created_at: parse_db_timestamp(&row.created_at),
        org_id: row.org_id,
    }
}

/// A row with an unparseable event type is unreadable and skipped; a row
/// with an unparseable payload is kept with a null payload so one corrupt
/// document never blocks listing the rest.
fn row_to_approval_event(row: ApprovalRow) -> Option<ApprovalEvent> {
    let event_type = match ApprovalEventType::parse(&row.event_type) {
        Some(t) => t,
        None => {
            warn!(event_id = %row.event_id, event_type = %row.event_type,
                "Unknown stored event type, skipping row");
            return None;
        }
    };

    let payload = serde_json::from_str(&row.payload).unwrap_or_else(|_| {
        warn!(event_id = %row.event_id, "Malformed stored payload, substituting null");
        serde_json::Value::Null
    });

    Some(ApprovalEvent {
        event_id: row.event_id,
        org_id: row.org_id,
        agent_name: row.agent_name,
        decision_point_id: row.decision_point_id,
        event_type,
        created_at: parse_db_timestamp(&row.created_at),
        sim_run_id: row.sim_run_id,
        payload,
    })
}
