//! Log command: show the persisted sync log.

use crate::error::Result;
use crate::storage::events::get_log_entries;
use crate::storage::{LogEntry, SqliteStorage};
use chrono::DateTime;
use colored::Colorize;
use std::path::Path;

use super::existing_db_path;

/// Execute the log command. Entries are listed newest first.
///
/// # Errors
///
/// Returns an error if the database is missing or cannot be queried.
pub fn execute(
    db_path: Option<&Path>,
    limit: u32,
    errors_only: bool,
    run_id: Option<&str>,
    json: bool,
) -> Result<()> {
    let db_path = existing_db_path(db_path)?;
    let storage = SqliteStorage::open(&db_path)?;
    let entries = get_log_entries(storage.conn(), run_id, errors_only, Some(limit))?;

    if json {
        println!("{}", serde_json::to_string(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No sync log entries.");
        return Ok(());
    }
    for entry in &entries {
        print_entry(entry);
    }
    Ok(())
}

fn print_entry(entry: &LogEntry) {
    let when = DateTime::from_timestamp_millis(entry.created_at)
        .map_or_else(|| entry.created_at.to_string(), |d| d.format("%Y-%m-%d %H:%M:%S").to_string());
    let run = entry.run_id.get(..8).unwrap_or(&entry.run_id);

    match &entry.error {
        Some(error) => println!(
            "{} {} {} {}",
            when.dimmed(),
            run.dimmed(),
            entry.label.red(),
            error
        ),
        None => println!("{} {} {}", when.dimmed(), run.dimmed(), entry.label),
    }
    if let Some(context) = &entry.context {
        println!("    {context}");
    }
}
