//! SQLite storage layer for ordersync.
//!
//! This module provides the local side of the sync using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - Durable scan cursors
//! - A persisted audit log of sync runs
//!
//! # Submodules
//!
//! - [`events`] - Sync log storage
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod events;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use events::LogEntry;
pub use sqlite::{EntityCounts, SqliteStorage};
