//! Sync log storage and retrieval.
//!
//! Every audit event of a sync run is persisted here, tagged with the run id
//! so one invocation's events can be read back together.

use rusqlite::{Connection, Result};

/// A persisted audit event.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LogEntry {
    pub id: i64,
    /// Correlation id of the `process()` call that produced the event.
    pub run_id: String,
    pub label: String,
    pub context: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: i64,
}

impl LogEntry {
    /// Create a new entry (id will be assigned by database).
    #[must_use]
    pub fn new(run_id: &str, label: &str) -> Self {
        Self {
            id: 0,
            run_id: run_id.to_string(),
            label: label.to_string(),
            context: None,
            error: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Attach the structured context.
    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        if !context.is_null() {
            self.context = Some(context);
        }
        self
    }

    /// Attach the error text.
    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Insert a log entry into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_log_entry(conn: &Connection, entry: &LogEntry) -> Result<i64> {
    let context = entry.context.as_ref().map(serde_json::Value::to_string);
    conn.execute(
        "INSERT INTO sync_log (run_id, label, context, error, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            entry.run_id,
            entry.label,
            context,
            entry.error,
            entry.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get the most recent log entries, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_log_entries(
    conn: &Connection,
    run_id: Option<&str>,
    errors_only: bool,
    limit: Option<u32>,
) -> Result<Vec<LogEntry>> {
    let limit = limit.unwrap_or(50);
    let mut stmt = conn.prepare(
        "SELECT id, run_id, label, context, error, created_at
         FROM sync_log
         WHERE (?1 IS NULL OR run_id = ?1)
           AND (?2 = 0 OR error IS NOT NULL)
         ORDER BY id DESC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(rusqlite::params![run_id, errors_only, limit], |row| {
        let context: Option<String> = row.get(3)?;
        Ok(LogEntry {
            id: row.get(0)?,
            run_id: row.get(1)?,
            label: row.get(2)?,
            context: context.and_then(|c| serde_json::from_str(&c).ok()),
            error: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;

    rows.collect()
}
