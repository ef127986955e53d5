//! Audit log sink.
//!
//! The engine reports every notable step of a run as an [`AuditEvent`]:
//! a label, a JSON context and an optional error. Where the events go is the
//! caller's choice:
//!
//! - [`SqliteAuditLog`] persists them to the `sync_log` table
//! - [`TracingAudit`] only emits them as tracing events
//! - [`MemoryAudit`] keeps them in a vector for tests
//!
//! Error events are additionally sent to the process-wide error log by the
//! engine, tagged with [`LOG_CATEGORY`].

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;
use crate::storage::events::{insert_log_entry, LogEntry};

/// Category tag of sync errors in the process-wide error log.
pub const LOG_CATEGORY: &str = "woocommerce";

/// One structured audit event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub label: String,
    pub context: Value,
    pub error: Option<String>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            context: Value::Null,
            error: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: &dyn std::fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Returns true if the event reports a failure.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Receiver of audit events. Logging never fails the run.
pub trait AuditLogger {
    fn log(&mut self, run_id: &str, event: &AuditEvent);
}

/// Emits audit events as tracing events only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudit;

impl AuditLogger for TracingAudit {
    fn log(&mut self, run_id: &str, event: &AuditEvent) {
        match &event.error {
            Some(error) => warn!(run_id, label = %event.label, context = %event.context, %error, "Audit"),
            None => info!(run_id, label = %event.label, context = %event.context, "Audit"),
        }
    }
}

/// Persists audit events to the `sync_log` table.
///
/// Holds its own connection so the log can be written while the storage
/// connection is inside a scan.
#[derive(Debug)]
pub struct SqliteAuditLog {
    conn: Connection,
}

impl SqliteAuditLog {
    /// Open the log on an existing ordersync database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }
}

impl AuditLogger for SqliteAuditLog {
    fn log(&mut self, run_id: &str, event: &AuditEvent) {
        let mut entry = LogEntry::new(run_id, &event.label).with_context(event.context.clone());
        if let Some(error) = &event.error {
            entry = entry.with_error(error);
        }
        if let Err(e) = insert_log_entry(&self.conn, &entry) {
            warn!(label = %event.label, error = %e, "Failed to persist audit event");
        }
    }
}

/// Collects audit events in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryAudit {
    pub events: Vec<AuditEvent>,
}

impl MemoryAudit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels of all events, in order.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.label.as_str()).collect()
    }

    /// Events that carry an error.
    #[must_use]
    pub fn errors(&self) -> Vec<&AuditEvent> {
        self.events.iter().filter(|e| e.is_error()).collect()
    }
}

impl AuditLogger for MemoryAudit {
    fn log(&mut self, _run_id: &str, event: &AuditEvent) {
        self.events.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::events::get_log_entries;
    use crate::storage::SqliteStorage;
    use serde_json::json;

    #[test]
    fn test_memory_audit() {
        let mut audit = MemoryAudit::new();
        audit.log("r", &AuditEvent::new("Start import order"));
        audit.log(
            "r",
            &AuditEvent::new("Import orders").with_error(&"connection reset"),
        );

        assert_eq!(audit.labels(), vec!["Start import order", "Import orders"]);
        assert_eq!(audit.errors().len(), 1);
        assert_eq!(audit.errors()[0].error.as_deref(), Some("connection reset"));
    }

    #[test]
    fn test_sqlite_audit_log_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ordersync.db");
        let storage = SqliteStorage::open(&path).unwrap();

        let mut audit = SqliteAuditLog::open(&path).unwrap();
        audit.log(
            "run-7",
            &AuditEvent::new("Export order").with_context(json!({"YF": {"id": 3}, "exported": 1})),
        );
        audit.log(
            "run-7",
            &AuditEvent::new("Export order").with_error(&"422 Unprocessable Entity"),
        );

        let entries = get_log_entries(storage.conn(), Some("run-7"), false, None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].context.as_ref().unwrap()["exported"], 1);
        assert_eq!(entries[0].error.as_deref(), Some("422 Unprocessable Entity"));
        assert!(entries[0].context.is_none());
    }
}
