//! Scan checkpoints.
//!
//! A scan cursor bounds one pass over a source with a time window
//! (`end_date`, `start_date`) and remembers the last record processed in that
//! pass (`run_id`). Cursors are keyed per direction and entity, e.g.
//! `import_orders`.
//!
//! # Lifecycle
//!
//! 1. `reset` opens a window ending now: `start_date = now`,
//!    `end_date = previous start_date`, `run_id = 0`.
//! 2. `advance` records the id of every processed record.
//! 3. `close` collapses the window (`end_date = start_date`, `run_id = 0`)
//!    once the source is exhausted. A closed cursor is fresh again, so the
//!    next run opens the window that follows it.
//!
//! A scan interrupted between 1 and 3 leaves a non-fresh cursor behind and
//! the next run resumes inside the same window.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::types::{ScanDirection, SyncResult};

/// Key of one scan checkpoint: a direction plus an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanKey {
    pub direction: ScanDirection,
    pub entity: String,
}

impl ScanKey {
    #[must_use]
    pub fn new(direction: ScanDirection, entity: &str) -> Self {
        Self {
            direction,
            entity: entity.to_string(),
        }
    }

    #[must_use]
    pub fn import(entity: &str) -> Self {
        Self::new(ScanDirection::Import, entity)
    }

    #[must_use]
    pub fn export(entity: &str) -> Self {
        Self::new(ScanDirection::Export, entity)
    }

    /// Storage representation, e.g. `export_orders`.
    #[must_use]
    pub fn as_string(&self) -> String {
        format!("{}_{}", self.direction.as_str(), self.entity)
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let (direction, entity) = key.split_once('_')?;
        let direction = match direction {
            "import" => ScanDirection::Import,
            "export" => ScanDirection::Export,
            _ => return None,
        };
        if entity.is_empty() {
            return None;
        }
        Some(Self::new(direction, entity))
    }
}

impl fmt::Display for ScanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.direction.as_str(), self.entity)
    }
}

/// Checkpoint of one in-progress or completed scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor {
    pub key: String,
    /// Id of the last record processed in the current pass (0 = none).
    pub run_id: i64,
    /// Upper bound of the scan window; when the pass started.
    pub start_date: Option<DateTime<Utc>>,
    /// Lower bound of the scan window; when the previous pass started.
    pub end_date: Option<DateTime<Utc>>,
}

impl ScanCursor {
    /// Cursor for a key that has never been stored.
    #[must_use]
    pub fn absent(key: &ScanKey) -> Self {
        Self {
            key: key.as_string(),
            run_id: 0,
            start_date: None,
            end_date: None,
        }
    }

    /// Whether the cursor must be reset before a scan can use it.
    ///
    /// True when no pass was ever started, or when the last pass closed
    /// without leaving a record id behind.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.start_date.is_none() || (self.run_id == 0 && self.start_date == self.end_date)
    }

    /// Whether the pass has progressed past at least one record.
    #[must_use]
    pub const fn is_resuming(&self) -> bool {
        self.run_id != 0
    }
}

/// Durable storage for scan cursors.
///
/// A missing cursor is never an error: `last_scan` returns
/// [`ScanCursor::absent`] for it.
pub trait CursorStore {
    /// Fetch the stored cursor, or an absent one.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Cursor` if the backing store cannot be read.
    fn last_scan(&self, key: &ScanKey) -> SyncResult<ScanCursor>;

    /// Open a new window ending now.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Cursor` if the backing store cannot be written.
    fn reset(&mut self, key: &ScanKey) -> SyncResult<()>;

    /// Record the last processed id. Repeating the same id is harmless.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Cursor` if the backing store cannot be written.
    fn advance(&mut self, key: &ScanKey, last_id: i64) -> SyncResult<()>;

    /// Mark the pass complete: `end_date = start_date`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Cursor` if the backing store cannot be written.
    fn close(&mut self, key: &ScanKey, start_date: Option<DateTime<Utc>>) -> SyncResult<()>;
}

/// Compute the cursor `reset` stores, given the current one.
#[must_use]
pub fn reset_cursor(current: &ScanCursor, now: DateTime<Utc>) -> ScanCursor {
    ScanCursor {
        key: current.key.clone(),
        run_id: 0,
        start_date: Some(now),
        end_date: current.start_date,
    }
}

/// In-memory cursor store.
///
/// Used by tests and by callers that want a run without durable checkpoints.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: HashMap<String, ScanCursor>,
}

impl MemoryCursorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a cursor (for tests that start mid-scan).
    pub fn insert(&mut self, cursor: ScanCursor) {
        self.cursors.insert(cursor.key.clone(), cursor);
    }
}

impl CursorStore for MemoryCursorStore {
    fn last_scan(&self, key: &ScanKey) -> SyncResult<ScanCursor> {
        Ok(self
            .cursors
            .get(&key.as_string())
            .cloned()
            .unwrap_or_else(|| ScanCursor::absent(key)))
    }

    fn reset(&mut self, key: &ScanKey) -> SyncResult<()> {
        let current = self.last_scan(key)?;
        self.insert(reset_cursor(&current, Utc::now()));
        Ok(())
    }

    fn advance(&mut self, key: &ScanKey, last_id: i64) -> SyncResult<()> {
        let mut cursor = self.last_scan(key)?;
        cursor.run_id = last_id;
        self.insert(cursor);
        Ok(())
    }

    fn close(&mut self, key: &ScanKey, start_date: Option<DateTime<Utc>>) -> SyncResult<()> {
        let mut cursor = self.last_scan(key)?;
        cursor.run_id = 0;
        cursor.start_date = start_date;
        cursor.end_date = start_date;
        self.insert(cursor);
        Ok(())
    }
}
