//! Cursor commands: inspect and force-reset scan checkpoints.

use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use crate::sync::{mapper_for, CursorStore, ScanCursor, ScanKey};
use chrono::{DateTime, Utc};
use std::path::Path;

use super::existing_db_path;

/// Show one stored cursor, or all of them.
///
/// # Errors
///
/// Returns `Error::CursorNotFound` if `key` names a cursor that was never
/// stored.
pub fn show(key: Option<&str>, db_path: Option<&Path>, json: bool) -> Result<()> {
    let db_path = existing_db_path(db_path)?;
    let storage = SqliteStorage::open(&db_path)?;

    let cursors = match key {
        Some(key) => {
            let key = parse_key(key)?;
            let cursor = storage
                .list_scans()?
                .into_iter()
                .find(|c| c.key == key.as_string())
                .ok_or_else(|| Error::CursorNotFound {
                    key: key.as_string(),
                })?;
            vec![cursor]
        }
        None => storage.list_scans()?,
    };

    if json {
        println!("{}", serde_json::to_string(&cursors)?);
        return Ok(());
    }

    if cursors.is_empty() {
        println!("No scan cursors stored yet.");
        return Ok(());
    }
    for cursor in &cursors {
        print_cursor(cursor);
    }
    Ok(())
}

/// Open a new window ending now for one cursor.
///
/// The next scan starts from the first page of the window between the
/// cursor's previous start and now.
///
/// # Errors
///
/// Returns `Error::InvalidArgument` for a malformed key and
/// `Error::UnknownEntity` for an entity without a mapper.
pub fn reset(key: &str, db_path: Option<&Path>, json: bool) -> Result<()> {
    let db_path = existing_db_path(db_path)?;
    let key = parse_key(key)?;
    let mut storage = SqliteStorage::open(&db_path)?;

    storage.reset(&key)?;
    let cursor = storage.last_scan(&key)?;

    if json {
        println!("{}", serde_json::to_string(&cursor)?);
    } else {
        println!("Reset {}", cursor.key);
        print_cursor(&cursor);
    }
    Ok(())
}

fn parse_key(key: &str) -> Result<ScanKey> {
    let parsed = ScanKey::parse(key).ok_or_else(|| {
        Error::InvalidArgument(format!(
            "'{key}' is not a cursor key (expected import_<entity> or export_<entity>)"
        ))
    })?;
    if mapper_for(&parsed.entity).is_none() {
        return Err(Error::UnknownEntity {
            name: parsed.entity,
        });
    }
    Ok(parsed)
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn print_cursor(cursor: &ScanCursor) {
    let state = if cursor.is_fresh() {
        "closed"
    } else if cursor.is_resuming() {
        "resuming"
    } else {
        "open"
    };
    println!("{} [{state}]", cursor.key);
    println!("  Last id:   {}", cursor.run_id);
    println!("  Window:    {} .. {}", format_date(cursor.end_date), format_date(cursor.start_date));
}
