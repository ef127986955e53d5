//! Database schema definitions.
//!
//! Local entity tables, scan checkpoints and the sync log. Timestamps are
//! stored as INTEGER (Unix milliseconds).

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the ordersync database.
pub const SCHEMA_SQL: &str = r"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Entity Tables
-- ====================

-- Orders: local side of the order sync.
-- modified_at is the change marker scanned by exports; storing the
-- woocommerce_id correlation does not touch it.
CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    woocommerce_id INTEGER UNIQUE,
    number TEXT,
    status TEXT NOT NULL,
    currency TEXT,
    total TEXT,
    customer_name TEXT,
    customer_email TEXT,
    billing_address TEXT,
    note TEXT,
    payload_hash TEXT,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_orders_modified ON orders(modified_at);
CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);

-- ====================
-- Sync State
-- ====================

-- Scan checkpoints, one row per direction and entity (e.g. import_orders)
CREATE TABLE IF NOT EXISTS sync_scans (
    key TEXT PRIMARY KEY,
    run_id INTEGER NOT NULL DEFAULT 0,
    start_date INTEGER,
    end_date INTEGER,
    updated_at INTEGER NOT NULL
);

-- Audit log of sync runs
CREATE TABLE IF NOT EXISTS sync_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    label TEXT NOT NULL,
    context TEXT,
    error TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_log_created ON sync_log(created_at DESC);
";

/// Local table backing one entity type.
#[derive(Debug)]
pub struct EntityTable {
    /// Entity name as used in config and cursor keys.
    pub entity: &'static str,
    pub table: &'static str,
    /// Column holding the remote identifier.
    pub remote_id_column: &'static str,
    /// Columns a record may read or write (excluding id and bookkeeping).
    pub columns: &'static [&'static str],
}

impl EntityTable {
    /// Whether `column` can be projected or written.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }
}

/// Entity tables known to the local store.
pub const ENTITY_TABLES: &[EntityTable] = &[EntityTable {
    entity: "orders",
    table: "orders",
    remote_id_column: "woocommerce_id",
    columns: &[
        "woocommerce_id",
        "number",
        "status",
        "currency",
        "total",
        "customer_name",
        "customer_email",
        "billing_address",
        "note",
        "modified_at",
    ],
}];

/// Look up the table for an entity.
#[must_use]
pub fn entity_table(entity: &str) -> Option<&'static EntityTable> {
    ENTITY_TABLES.iter().find(|t| t.entity == entity)
}

/// Apply the schema to a database connection.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    // Set pragmas before schema creation
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    // Run migrations for existing databases
    super::migrations::run_migrations(conn)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}
