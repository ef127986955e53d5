//! Incremental two-way record sync.
//!
//! This module keeps a local entity table and a remote REST resource in step:
//!
//! - **Import**: remote pages → local upserts
//! - **Export**: local change window → remote creates/updates
//! - **Cursors**: durable per-direction checkpoints so an interrupted scan
//!   resumes where it stopped
//! - **Arbitration**: per-record ownership policy and same-run echo
//!   suppression
//!
//! # Architecture
//!
//! [`SyncEngine`] is generic over its collaborators:
//! 1. a [`LocalStore`] + [`CursorStore`] (the SQLite storage in production)
//! 2. a [`RemoteApi`](crate::remote::RemoteApi) client
//! 3. a [`RecordMapper`] per entity type
//! 4. an [`AuditLogger`] sink
//!
//! # Example
//!
//! ```ignore
//! use ordersync::sync::{OrderMapper, SyncEngine, TracingAudit};
//!
//! let mut audit = TracingAudit;
//! let report = SyncEngine::new(&mut storage, &client, &OrderMapper, &mut audit, settings)
//!     .log_all(config.log_all)
//!     .process();
//! ```

pub mod arbiter;
pub mod audit;
pub mod cursor;
pub mod engine;
pub mod fetcher;
mod hash;
pub mod local;
pub mod mapper;
pub mod orders;
mod types;

pub use arbiter::{ConflictArbiter, Verdict};
pub use audit::{AuditEvent, AuditLogger, MemoryAudit, SqliteAuditLog, TracingAudit, LOG_CATEGORY};
pub use cursor::{CursorStore, MemoryCursorStore, ScanCursor, ScanKey};
pub use engine::SyncEngine;
pub use fetcher::{LocalPageFetcher, RemotePageFetcher};
pub use hash::{content_hash, has_changed};
pub use local::{LocalQuery, LocalStore};
pub use mapper::RecordMapper;
pub use orders::OrderMapper;
pub use types::{
    DirectionReport, LocalId, MappingResult, RecordMap, RemoteId, RunReport, RunState,
    ScanDirection, ScanOutcome, SyncDirection, SyncError, SyncResult,
};

/// Entity types with a local table and a mapper.
pub const SUPPORTED_ENTITIES: &[&str] = &["orders"];

/// Mapper for a supported entity.
#[must_use]
pub fn mapper_for(entity: &str) -> Option<&'static dyn RecordMapper> {
    match entity {
        "orders" => Some(&OrderMapper),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_supported_entity_has_mapper_and_table() {
        for entity in SUPPORTED_ENTITIES {
            let mapper = mapper_for(entity).unwrap();
            assert_eq!(mapper.entity(), *entity);
            assert!(crate::storage::schema::entity_table(entity).is_some());
        }
        assert!(mapper_for("invoices").is_none());
    }
}
