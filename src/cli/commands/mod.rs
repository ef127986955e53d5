//! Command implementations.

pub mod completions;
pub mod cursor;
pub mod init;
pub mod log;
pub mod run;
pub mod status;
pub mod version;

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Resolve the database path and require that it was initialized.
pub(crate) fn existing_db_path(db_path: Option<&Path>) -> Result<PathBuf> {
    let db_path = resolve_db_path(db_path).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }
    Ok(db_path)
}
