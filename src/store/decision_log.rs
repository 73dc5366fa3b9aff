//! Decision log — one durable row per processed message.
//!
//! Backed by libSQL. The schema is created idempotently on open, so
//! repeated initialization against the same file is safe. The poller is
//! the only writer; the dashboard reads concurrently, which SQLite's
//! transactional file locking handles without coordination here.
//!
//! Storage format (kept compatible with the original log):
//! `id` autoincrement, `title` text, `timestamp` RFC 3339 text, `action`
//! disposition string, `created_at` RFC 3339 write time. All ordering
//! queries sort by `timestamp` descending.

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::taxonomy::Disposition;

const RECORD_COLUMNS: &str = "id, title, timestamp, action, created_at";

/// One persisted decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: i64,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub disposition: Disposition,
    pub created_at: DateTime<Utc>,
}

/// Append-only record store for triage decisions.
pub struct DecisionLog {
    conn: Connection,
}

impl DecisionLog {
    /// Open (or create) the log at the given path and ensure the schema.
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Open(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Open(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Open(format!("Failed to create connection: {e}")))?;

        let log = Self { conn };
        log.init_schema().await?;
        info!(path = %path.display(), "Decision log opened");
        Ok(log)
    }

    /// Open an in-memory log (for tests).
    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Open(format!("Failed to create in-memory db: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Open(format!("Failed to create connection: {e}")))?;

        let log = Self { conn };
        log.init_schema().await?;
        Ok(log)
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS decisions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    action TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Schema creation failed: {e}")))?;
        Ok(())
    }

    /// Append a decision made now. Returns the new record id.
    pub async fn append(
        &self,
        title: &str,
        disposition: Disposition,
    ) -> Result<i64, DatabaseError> {
        self.append_at(title, disposition, Utc::now()).await
    }

    /// Append a decision with an explicit timestamp. Returns the new record id.
    pub async fn append_at(
        &self,
        title: &str,
        disposition: Disposition,
        timestamp: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO decisions (title, timestamp, action, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    title,
                    timestamp.to_rfc3339(),
                    disposition.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Insert failed: {e}")))?;

        let id = self.conn.last_insert_rowid();
        debug!(id, title, disposition = %disposition, "Decision recorded");
        Ok(id)
    }

    /// All records, most recent decision first.
    pub async fn list_all(&self) -> Result<Vec<DecisionRecord>, DatabaseError> {
        self.query(
            &format!("SELECT {RECORD_COLUMNS} FROM decisions ORDER BY timestamp DESC"),
            (),
        )
        .await
    }

    /// The `limit` most recent records. `limit` must be positive.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<DecisionRecord>, DatabaseError> {
        if limit == 0 {
            return Err(DatabaseError::InvalidLimit);
        }
        self.query(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM decisions ORDER BY timestamp DESC LIMIT ?1"
            ),
            params![limit as i64],
        )
        .await
    }

    /// All records with the given disposition, most recent first.
    pub async fn list_by_disposition(
        &self,
        disposition: Disposition,
    ) -> Result<Vec<DecisionRecord>, DatabaseError> {
        self.query(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM decisions WHERE action = ?1 ORDER BY timestamp DESC"
            ),
            params![disposition.as_str()],
        )
        .await
    }

    /// Re-triage: rewrite only the disposition of an existing record.
    /// `title` and `timestamp` are untouched.
    pub async fn update_disposition(
        &self,
        id: i64,
        new_disposition: Disposition,
    ) -> Result<(), DatabaseError> {
        let changed = self
            .conn
            .execute(
                "UPDATE decisions SET action = ?1 WHERE id = ?2",
                params![new_disposition.as_str(), id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Update failed: {e}")))?;

        if changed == 0 {
            return Err(DatabaseError::NotFound(id));
        }
        debug!(id, disposition = %new_disposition, "Disposition updated");
        Ok(())
    }

    async fn query(
        &self,
        sql: &str,
        args: impl libsql::params::IntoParams,
    ) -> Result<Vec<DecisionRecord>, DatabaseError> {
        let mut rows = self
            .conn
            .query(sql, args)
            .await
            .map_err(|e| DatabaseError::Query(format!("Query failed: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("Row fetch failed: {e}")))?
        {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }
}

fn row_to_record(row: &libsql::Row) -> Result<DecisionRecord, DatabaseError> {
    let id: i64 = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("Bad id column: {e}")))?;
    let title: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("Bad title column: {e}")))?;
    let timestamp: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("Bad timestamp column: {e}")))?;
    let action: String = row
        .get(3)
        .map_err(|e| DatabaseError::Query(format!("Bad action column: {e}")))?;
    let created_at: String = row
        .get(4)
        .map_err(|e| DatabaseError::Query(format!("Bad created_at column: {e}")))?;

    Ok(DecisionRecord {
        id,
        title,
        timestamp: parse_datetime(&timestamp),
        disposition: Disposition::parse(&action),
        created_at: parse_datetime(&created_at),
    })
}

/// Parse an RFC 3339 timestamp, tolerating SQLite `datetime()` output in
/// manually edited rows.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}
