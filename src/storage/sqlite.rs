//! SQLite storage implementation.
//!
//! This module provides the local side of the sync: entity tables read and
//! written as opaque records, plus the durable scan cursors.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde_json::Value;
use tracing::trace;

use crate::error::Result;
use crate::storage::schema::{apply_schema, entity_table, EntityTable};
use crate::sync::cursor::{reset_cursor, CursorStore, ScanCursor, ScanKey};
use crate::sync::local::{LocalQuery, LocalStore};
use crate::sync::{
    content_hash, has_changed, LocalId, RecordMap, RemoteId, SyncError, SyncResult,
};

/// Column that marks a record as changed; maintained by the store.
const MODIFIED_COLUMN: &str = "modified_at";

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Record counts for one entity table.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct EntityCounts {
    pub entity: String,
    /// Number of local records.
    pub records: usize,
    /// Number of local records carrying a remote id.
    pub correlated: usize,
}

impl EntityCounts {
    /// Records that have never been exported.
    #[must_use]
    pub fn uncorrelated(&self) -> usize {
        self.records.saturating_sub(self.correlated)
    }
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a write inside an IMMEDIATE transaction.
    ///
    /// The transaction commits when the closure succeeds and rolls back
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or the error of beginning or committing
    /// the transaction.
    pub fn mutate<F, R, E>(&mut self, op: &str, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&Transaction) -> std::result::Result<R, E>,
        E: From<rusqlite::Error>,
    {
        trace!(op, "Begin mutation");
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let result = f(&tx)?;

        tx.commit()?;
        Ok(result)
    }

    // ==================
    // Scan Cursors
    // ==================

    /// List every stored scan cursor, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_scans(&self) -> Result<Vec<ScanCursor>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, run_id, start_date, end_date FROM sync_scans ORDER BY key")?;
        let rows = stmt.query_map([], map_scan_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn read_scan(&self, key: &ScanKey) -> rusqlite::Result<Option<ScanCursor>> {
        self.conn
            .query_row(
                "SELECT key, run_id, start_date, end_date FROM sync_scans WHERE key = ?1",
                [key.as_string()],
                map_scan_row,
            )
            .optional()
    }

    fn write_scan(&self, cursor: &ScanCursor) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO sync_scans (key, run_id, start_date, end_date, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET
               run_id = excluded.run_id,
               start_date = excluded.start_date,
               end_date = excluded.end_date,
               updated_at = excluded.updated_at",
            rusqlite::params![
                cursor.key,
                cursor.run_id,
                cursor.start_date.map(|d| d.timestamp_millis()),
                cursor.end_date.map(|d| d.timestamp_millis()),
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    // ==================
    // Entity Statistics
    // ==================

    /// Count local records and how many of them are correlated.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownEntity` if the entity has no table.
    pub fn entity_counts(&self, entity: &str) -> Result<EntityCounts> {
        let table = entity_table(entity).ok_or_else(|| crate::Error::UnknownEntity {
            name: entity.to_string(),
        })?;
        let (records, correlated): (i64, i64) = self.conn.query_row(
            &format!(
                "SELECT COUNT(*), COUNT({}) FROM {}",
                table.remote_id_column, table.table
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(EntityCounts {
            entity: entity.to_string(),
            records: usize::try_from(records).unwrap_or(0),
            correlated: usize::try_from(correlated).unwrap_or(0),
        })
    }
}

fn map_scan_row(row: &rusqlite::Row) -> rusqlite::Result<ScanCursor> {
    let start: Option<i64> = row.get(2)?;
    let end: Option<i64> = row.get(3)?;
    Ok(ScanCursor {
        key: row.get(0)?,
        run_id: row.get(1)?,
        start_date: start.and_then(DateTime::from_timestamp_millis),
        end_date: end.and_then(DateTime::from_timestamp_millis),
    })
}

fn cursor_error(err: rusqlite::Error) -> SyncError {
    SyncError::Cursor(err.to_string())
}

fn local_write_error(err: impl std::fmt::Display) -> SyncError {
    SyncError::RecordWrite {
        side: "local",
        message: err.to_string(),
    }
}

fn table_for(entity: &str) -> SyncResult<&'static EntityTable> {
    entity_table(entity).ok_or_else(|| SyncError::UnknownEntity(entity.to_string()))
}

/// Convert a JSON value to a column value.
///
/// Arrays and objects are stored as their JSON text.
fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => n.as_i64().map_or_else(
            || SqlValue::Real(n.as_f64().unwrap_or_default()),
            SqlValue::Integer,
        ),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Convert a column value to JSON. Blobs are not part of any entity table.
fn from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null | SqlValue::Blob(_) => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        SqlValue::Text(s) => Value::String(s),
    }
}

/// Columns of `record` that may be written, in record order.
fn writable_columns<'a>(
    table: &EntityTable,
    record: &'a RecordMap,
) -> SyncResult<Vec<(&'a str, SqlValue)>> {
    record
        .iter()
        .map(|(column, value)| {
            if column == MODIFIED_COLUMN || !table.has_column(column) {
                Err(local_write_error(format!(
                    "column {column} is not writable on {}",
                    table.table
                )))
            } else {
                Ok((column.as_str(), to_sql(value)))
            }
        })
        .collect()
}

fn projection(table: &EntityTable, fields: &[String]) -> SyncResult<Vec<&'static str>> {
    if fields.is_empty() {
        return Ok(table.columns.to_vec());
    }
    fields
        .iter()
        .map(|field| {
            table
                .columns
                .iter()
                .find(|c| **c == field.as_str())
                .copied()
                .ok_or_else(|| {
                    SyncError::Database(format!("unknown column {field} on {}", table.table))
                })
        })
        .collect()
}

fn insert_record(
    tx: &Transaction,
    table: &EntityTable,
    columns: &[(&str, SqlValue)],
    hash: &str,
) -> rusqlite::Result<LocalId> {
    let now = Utc::now().timestamp_millis();
    let mut names: Vec<&str> = columns.iter().map(|(c, _)| *c).collect();
    names.extend(["payload_hash", "created_at", MODIFIED_COLUMN]);

    let mut values: Vec<SqlValue> = columns.iter().map(|(_, v)| v.clone()).collect();
    values.extend([
        SqlValue::Text(hash.to_string()),
        SqlValue::Integer(now),
        SqlValue::Integer(now),
    ]);

    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
    tx.execute(
        &format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.table,
            names.join(", "),
            placeholders.join(", ")
        ),
        rusqlite::params_from_iter(values),
    )?;
    Ok(tx.last_insert_rowid())
}

fn update_record(
    tx: &Transaction,
    table: &EntityTable,
    id: LocalId,
    columns: &[(&str, SqlValue)],
    hash: &str,
) -> rusqlite::Result<()> {
    let mut assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, (c, _))| format!("{c} = ?{}", i + 1))
        .collect();
    let next = columns.len();
    assignments.push(format!("payload_hash = ?{}", next + 1));
    assignments.push(format!("{MODIFIED_COLUMN} = ?{}", next + 2));

    let mut values: Vec<SqlValue> = columns.iter().map(|(_, v)| v.clone()).collect();
    values.extend([
        SqlValue::Text(hash.to_string()),
        SqlValue::Integer(Utc::now().timestamp_millis()),
        SqlValue::Integer(id),
    ]);

    tx.execute(
        &format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            table.table,
            assignments.join(", "),
            next + 3
        ),
        rusqlite::params_from_iter(values),
    )?;
    Ok(())
}

impl LocalStore for SqliteStorage {
    fn query(&self, entity: &str, query: &LocalQuery) -> SyncResult<Vec<(LocalId, RecordMap)>> {
        let table = table_for(entity)?;
        let columns = projection(table, &query.fields)?;

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<SqlValue> = Vec::new();
        if let Some(before) = query.modified_before {
            params.push(SqlValue::Integer(before.timestamp_millis()));
            conditions.push(format!("{MODIFIED_COLUMN} < ?{}", params.len()));
        }
        if let Some(after) = query.modified_after {
            params.push(SqlValue::Integer(after.timestamp_millis()));
            conditions.push(format!("{MODIFIED_COLUMN} > ?{}", params.len()));
        }
        if let Some(after_id) = query.after_id {
            params.push(SqlValue::Integer(after_id));
            conditions.push(format!("id > ?{}", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        params.push(SqlValue::Integer(query.limit.map_or(-1, i64::from)));
        let limit_param = params.len();
        params.push(SqlValue::Integer(
            i64::try_from(query.offset).unwrap_or(i64::MAX),
        ));
        let offset_param = params.len();

        let sql = format!(
            "SELECT id, {} FROM {}{where_clause} ORDER BY id LIMIT ?{limit_param} OFFSET ?{offset_param}",
            columns.join(", "),
            table.table,
        );
        trace!(%sql, "Local query");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            let id: LocalId = row.get(0)?;
            let mut record = RecordMap::new();
            for (i, column) in columns.iter().enumerate() {
                let value: SqlValue = row.get(i + 1)?;
                record.insert((*column).to_string(), from_sql(value));
            }
            Ok((id, record))
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn find_by_remote_id(&self, entity: &str, remote_id: RemoteId) -> SyncResult<Option<LocalId>> {
        let table = table_for(entity)?;
        let id = self
            .conn
            .query_row(
                &format!(
                    "SELECT id FROM {} WHERE {} = ?1",
                    table.table, table.remote_id_column
                ),
                [remote_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn upsert(
        &mut self,
        entity: &str,
        id: Option<LocalId>,
        record: &RecordMap,
    ) -> SyncResult<LocalId> {
        let table = table_for(entity)?;
        let columns = writable_columns(table, record)?;
        let hash = content_hash(record)?;

        self.mutate("upsert", |tx| {
            let Some(id) = id else {
                return insert_record(tx, table, &columns, &hash).map_err(local_write_error);
            };

            let stored: Option<Option<String>> = tx
                .query_row(
                    &format!("SELECT payload_hash FROM {} WHERE id = ?1", table.table),
                    [id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(local_write_error)?;

            let Some(stored) = stored else {
                return Err(local_write_error(format!(
                    "{} record {id} does not exist",
                    table.entity
                )));
            };

            if has_changed(&hash, stored.as_deref()) {
                update_record(tx, table, id, &columns, &hash).map_err(local_write_error)?;
            } else {
                trace!(entity = table.entity, id, "Content unchanged, skipping write");
            }
            Ok(id)
        })
    }

    fn set_remote_id(&mut self, entity: &str, id: LocalId, remote_id: RemoteId) -> SyncResult<()> {
        let table = table_for(entity)?;
        let updated = self
            .conn
            .execute(
                &format!(
                    "UPDATE {} SET {} = ?1 WHERE id = ?2",
                    table.table, table.remote_id_column
                ),
                rusqlite::params![remote_id, id],
            )
            .map_err(local_write_error)?;

        if updated == 0 {
            return Err(local_write_error(format!(
                "{} record {id} does not exist",
                table.entity
            )));
        }
        Ok(())
    }
}

impl CursorStore for SqliteStorage {
    fn last_scan(&self, key: &ScanKey) -> SyncResult<ScanCursor> {
        Ok(self
            .read_scan(key)
            .map_err(cursor_error)?
            .unwrap_or_else(|| ScanCursor::absent(key)))
    }

    fn reset(&mut self, key: &ScanKey) -> SyncResult<()> {
        let current = self.last_scan(key)?;
        self.write_scan(&reset_cursor(&current, Utc::now()))
            .map_err(cursor_error)
    }

    fn advance(&mut self, key: &ScanKey, last_id: i64) -> SyncResult<()> {
        let mut cursor = self.last_scan(key)?;
        cursor.run_id = last_id;
        self.write_scan(&cursor).map_err(cursor_error)
    }

    fn close(&mut self, key: &ScanKey, start_date: Option<DateTime<Utc>>) -> SyncResult<()> {
        let cursor = ScanCursor {
            key: key.as_string(),
            run_id: 0,
            start_date,
            end_date: start_date,
        };
        self.write_scan(&cursor).map_err(cursor_error)
    }
}
