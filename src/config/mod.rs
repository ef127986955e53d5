//! Configuration management.
//!
//! This module resolves the ordersync directories and the database and
//! config file paths, and loads the sync configuration.
//!
//! # Layout
//!
//! - **Database**: `~/.ordersync/data/ordersync.db`
//! - **Config**: `~/.ordersync/config.json`
//!
//! Both can be moved with a CLI flag or an environment variable.

mod settings;

pub use settings::{EntitySettings, RemoteSettings, SyncConfig, DEFAULT_LIMIT};

use crate::error::Result;

use std::path::{Path, PathBuf};

/// Get the global ordersync directory location (`~/.ordersync/`).
#[must_use]
pub fn global_ordersync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".ordersync"))
}

/// Read a non-empty environment variable as a path.
fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `ORDERSYNC_DB` environment variable
/// 3. Global location: `~/.ordersync/data/ordersync.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Some(path) = env_path("ORDERSYNC_DB") {
        return Some(path);
    }

    global_ordersync_dir().map(|dir| dir.join("data").join("ordersync.db"))
}

/// Resolve the config file path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `ORDERSYNC_CONFIG` environment variable
/// 3. Global location: `~/.ordersync/config.json`
#[must_use]
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Some(path) = env_path("ORDERSYNC_CONFIG") {
        return Some(path);
    }

    global_ordersync_dir().map(|dir| dir.join("config.json"))
}

/// Load the sync configuration with credential overrides from the
/// environment, and validate it.
///
/// A missing config file yields the defaults.
///
/// # Errors
///
/// Returns `Error::Config` if the file is unreadable or holds invalid values.
pub fn load_config(explicit_path: Option<&Path>) -> Result<SyncConfig> {
    let mut config = match resolve_config_path(explicit_path) {
        Some(path) => SyncConfig::load(&path)?,
        None => SyncConfig::with_defaults(),
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/db.sqlite");
        let result = resolve_db_path(Some(&explicit));
        assert_eq!(result, Some(explicit));
    }

    #[test]
    fn test_resolve_config_path_with_explicit() {
        let explicit = PathBuf::from("/etc/ordersync.json");
        assert_eq!(resolve_config_path(Some(&explicit)), Some(explicit));
    }

    #[test]
    fn test_global_dir_returns_some() {
        let dir = global_ordersync_dir().unwrap();
        assert!(dir.ends_with(".ordersync"));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"logAll": true, "entities": {"orders": {"limit": 5}}}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert!(config.log_all);
        assert_eq!(config.entity("orders").limit, 5);
    }

    #[test]
    fn test_load_config_rejects_zero_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"entities": {"orders": {"limit": 0}}}"#).unwrap();

        assert!(load_config(Some(&path)).is_err());
    }
}
