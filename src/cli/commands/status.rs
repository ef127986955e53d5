//! Status command: cursors and correlation per entity.

use crate::config::{load_config, EntitySettings};
use crate::error::Result;
use crate::storage::{EntityCounts, SqliteStorage};
use crate::sync::{CursorStore, ScanCursor, ScanKey, SUPPORTED_ENTITIES};
use serde::Serialize;
use std::path::Path;

use super::existing_db_path;

/// Output for one entity.
#[derive(Serialize)]
struct EntityStatus {
    #[serde(flatten)]
    counts: EntityCounts,
    settings: EntitySettings,
    import: ScanCursor,
    export: ScanCursor,
}

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if the database is missing, the configuration is
/// invalid, or a query fails.
pub fn execute(db_path: Option<&Path>, config_path: Option<&Path>, json: bool) -> Result<()> {
    let db_path = existing_db_path(db_path)?;
    let config = load_config(config_path)?;
    let storage = SqliteStorage::open(&db_path)?;

    let mut statuses = Vec::with_capacity(SUPPORTED_ENTITIES.len());
    for entity in SUPPORTED_ENTITIES {
        statuses.push(EntityStatus {
            counts: storage.entity_counts(entity)?,
            settings: config.entity(entity),
            import: storage.last_scan(&ScanKey::import(entity))?,
            export: storage.last_scan(&ScanKey::export(entity))?,
        });
    }

    if json {
        println!("{}", serde_json::to_string(&statuses)?);
        return Ok(());
    }

    println!("ordersync Status");
    println!("================");
    println!();
    println!(
        "Remote: {}",
        config.remote.url.as_deref().unwrap_or("(not configured)")
    );

    for status in &statuses {
        let settings = &status.settings;
        println!();
        println!(
            "{} ({}, {}{})",
            status.counts.entity,
            if settings.enabled { "enabled" } else { "disabled" },
            settings.direction,
            if settings.master { ", remote is master" } else { "" }
        );
        println!("  Records:      {}", status.counts.records);
        println!("  Correlated:   {}", status.counts.correlated);
        println!("  Unexported:   {}", status.counts.uncorrelated());
        println!("  Import last:  {}", cursor_summary(&status.import));
        println!("  Export last:  {}", cursor_summary(&status.export));
    }

    Ok(())
}

fn cursor_summary(cursor: &ScanCursor) -> String {
    match cursor.start_date {
        None => "never".to_string(),
        Some(start) if cursor.is_resuming() => format!(
            "interrupted after id {} (pass started {})",
            cursor.run_id,
            start.format("%Y-%m-%d %H:%M:%S")
        ),
        Some(start) => format!("pass started {}", start.format("%Y-%m-%d %H:%M:%S")),
    }
}
