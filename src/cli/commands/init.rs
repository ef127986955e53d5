//! Initialize ordersync.
//!
//! Creates the database (schema is applied on open) and writes a default
//! config file next to it unless one already exists. With `--force` the
//! schema is re-applied to an existing database and the config file is
//! rewritten with defaults; stored records and cursors are kept.

use crate::config::{resolve_config_path, resolve_db_path, SyncConfig};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    config: PathBuf,
    config_written: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `Error::AlreadyInitialized` if the database exists and `force` is
/// not set, or an error if the directory, database or config cannot be
/// created.
pub fn execute(
    db_path: Option<&Path>,
    config_path: Option<&Path>,
    force: bool,
    json: bool,
) -> Result<()> {
    let db_path = resolve_db_path(db_path)
        .ok_or_else(|| Error::Config("Could not determine the ordersync directory".to_string()))?;
    let config_path = resolve_config_path(config_path)
        .ok_or_else(|| Error::Config("Could not determine the ordersync directory".to_string()))?;

    if db_path.exists() && !force {
        return Err(Error::AlreadyInitialized { path: db_path });
    }

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    SqliteStorage::open(&db_path)?;

    let config_written = !config_path.exists() || force;
    if config_written {
        SyncConfig::with_defaults().save(&config_path)?;
    }

    if json {
        let output = InitOutput {
            database: db_path,
            config: config_path,
            config_written,
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
    } else {
        println!("Initialized ordersync");
        println!("  Database: {}", db_path.display());
        if config_written {
            println!("  Config:   {}", config_path.display());
            println!();
            println!(
                "Next: fill the `remote` section of the config (or set WC_URL, \
                 WC_CONSUMER_KEY, WC_CONSUMER_SECRET) and run 'ordersync run'."
            );
        } else {
            println!("  Config:   {} (kept)", config_path.display());
        }
    }

    Ok(())
}
