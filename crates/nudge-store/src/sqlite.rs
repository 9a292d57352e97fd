//! SQLite-backed nudge history and behavior log.
//! Timestamps are stored as microseconds since the epoch so window queries
//! compare integers rather than strings.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nudge_core::traits::HistoryStore;
use nudge_core::{BehaviorEvent, ENGINE_EVENTS, EventQuery, NudgeError, NudgeHistoryRecord, Result};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

fn db_err(e: rusqlite::Error) -> NudgeError {
    NudgeError::Store(e.to_string())
}

fn from_micros(us: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(us).unwrap_or_default()
}

/// SQLite history store.
pub struct SqliteHistory {
    conn: Mutex<Connection>,
}

impl SqliteHistory {
    /// Open or create the history database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        tracing::info!("💾 Nudge history opened at {}", path.display());
        Ok(db)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| NudgeError::Store("connection lock poisoned".into()))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            -- One row per send decision
            CREATE TABLE IF NOT EXISTS nudge_history (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                nudge_type TEXT NOT NULL,
                sent_at INTEGER NOT NULL,        -- unix micros
                opened INTEGER,                  -- NULL until engagement, then 0/1
                clicked_at INTEGER,
                metadata TEXT NOT NULL DEFAULT 'null'
            );
            CREATE INDEX IF NOT EXISTS idx_nudge_history_user_sent
                ON nudge_history (user_id, sent_at DESC);

            -- Behavior log (sends, engagement, product events)
            CREATE TABLE IF NOT EXISTS behavior_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                path TEXT NOT NULL,
                payload TEXT NOT NULL DEFAULT '{}',
                timestamp INTEGER NOT NULL       -- unix micros
            );
            CREATE INDEX IF NOT EXISTS idx_behavior_log_type_time
                ON behavior_log (event_type, timestamp);
         ",
            )
            .map_err(|e| NudgeError::Store(format!("Migration: {e}")))
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<NudgeHistoryRecord> {
        let opened: Option<i64> = row.get(4)?;
        let clicked_at: Option<i64> = row.get(5)?;
        let metadata: String = row.get(6)?;
        Ok(NudgeHistoryRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            nudge_type: row.get(2)?,
            sent_at: from_micros(row.get(3)?),
            opened: opened.map(|o| o != 0),
            clicked_at: clicked_at.map(from_micros),
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        })
    }

    /// Fetch one record by id.
    pub fn get_record(&self, nudge_id: &str) -> Result<Option<NudgeHistoryRecord>> {
        self.conn()?
            .query_row(
                "SELECT id, user_id, nudge_type, sent_at, opened, clicked_at, metadata
                 FROM nudge_history WHERE id = ?1",
                params![nudge_id],
                Self::row_to_record,
            )
            .optional()
            .map_err(db_err)
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    async fn append_nudge(&self, record: &NudgeHistoryRecord) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO nudge_history (id, user_id, nudge_type, sent_at, opened, clicked_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.user_id,
                    record.nudge_type,
                    record.sent_at.timestamp_micros(),
                    record.opened.map(|o| o as i64),
                    record.clicked_at.map(|t| t.timestamp_micros()),
                    record.metadata.to_string(),
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    async fn recent_nudges(&self, user_id: &str, limit: usize) -> Result<Vec<NudgeHistoryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, nudge_type, sent_at, opened, clicked_at, metadata
                 FROM nudge_history WHERE user_id = ?1
                 ORDER BY sent_at DESC LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], Self::row_to_record)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    async fn count_nudges_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM nudge_history WHERE user_id = ?1 AND sent_at > ?2",
                params![user_id, since.timestamp_micros()],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        Ok(count as usize)
    }

    async fn mark_engagement(
        &self,
        nudge_id: &str,
        opened: bool,
        clicked_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE nudge_history
                 SET opened = ?2, clicked_at = COALESCE(?3, clicked_at)
                 WHERE id = ?1",
                params![
                    nudge_id,
                    opened as i64,
                    clicked_at.map(|t| t.timestamp_micros())
                ],
            )
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    async fn log_event(&self, event: &BehaviorEvent) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO behavior_log (user_id, session_id, event_type, path, payload, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.user_id,
                    event.session_id,
                    event.event_type,
                    event.path,
                    event.payload.to_string(),
                    event.timestamp.timestamp_micros(),
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    async fn count_events(&self, query: &EventQuery) -> Result<usize> {
        let [sent, opened, clicked] = ENGINE_EVENTS;
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM behavior_log
                 WHERE timestamp >= ?1
                   AND (?2 IS NULL OR event_type = ?2)
                   AND (?3 IS NULL OR instr(path, ?3) > 0)
                   AND (?4 = 0 OR event_type NOT IN (?5, ?6, ?7))",
                params![
                    query.since.timestamp_micros(),
                    query.event_type,
                    query.path_contains,
                    query.user_activity_only,
                    sent,
                    opened,
                    clicked,
                ],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        Ok(count as usize)
    }

    async fn event_times(
        &self,
        user_id: &str,
        event_types: &[&str],
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        if event_types.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; event_types.len()].join(", ");
        let sql = format!(
            "SELECT timestamp FROM behavior_log
             WHERE user_id = ? AND timestamp >= ? AND event_type IN ({placeholders})"
        );
        let mut values: Vec<rusqlite::types::Value> = vec![
            user_id.to_string().into(),
            since.timestamp_micros().into(),
        ];
        values.extend(event_types.iter().map(|t| t.to_string().into()));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(values), |r| r.get::<_, i64>(0))
            .map_err(db_err)?;
        rows.map(|r| r.map(from_micros))
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)
    }
}
