//! Sync types shared by the engine and its collaborators.
//!
//! This module defines the direction enums, the record shape exchanged
//! between both sides, the run-scoped correlation memory and the reports a
//! run produces.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Local record identifier (primary key of the local entity table).
pub type LocalId = i64;

/// Remote record identifier (the `id` field of the REST resource).
pub type RemoteId = i64;

/// Opaque key-value record as exchanged with either side.
pub type RecordMap = serde_json::Map<String, serde_json::Value>;

/// Which loops a sync run executes for an entity type.
///
/// The numeric codes match the values stored by existing installations
/// (`direction_<entity>` option): 0 = two-way, 1 = remote to local,
/// 2 = local to remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Remote → local only.
    #[serde(alias = "import")]
    ImportOnly,
    /// Local → remote only.
    #[serde(alias = "export")]
    ExportOnly,
    /// Import first, then export.
    #[default]
    #[serde(alias = "two-way", alias = "both")]
    TwoWay,
}

impl SyncDirection {
    /// Parse the legacy numeric option value.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::TwoWay),
            1 => Some(Self::ImportOnly),
            2 => Some(Self::ExportOnly),
            _ => None,
        }
    }

    /// Whether the import loop runs.
    #[must_use]
    pub const fn runs_import(self) -> bool {
        matches!(self, Self::ImportOnly | Self::TwoWay)
    }

    /// Whether the export loop runs.
    #[must_use]
    pub const fn runs_export(self) -> bool {
        matches!(self, Self::ExportOnly | Self::TwoWay)
    }
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "import" | "import-only" => Ok(Self::ImportOnly),
            "export" | "export-only" => Ok(Self::ExportOnly),
            "two-way" | "twoway" | "both" => Ok(Self::TwoWay),
            other => Err(format!("invalid direction: {other}")),
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ImportOnly => "import",
            Self::ExportOnly => "export",
            Self::TwoWay => "two-way",
        })
    }
}

/// One half of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanDirection {
    /// Remote → local.
    Import,
    /// Local → remote.
    Export,
}

impl ScanDirection {
    /// Get the string representation used in cursor keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Export => "export",
        }
    }
}

impl fmt::Display for ScanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of translating one record to the other side's shape.
///
/// `Empty` means "no valid translation" and is distinct from a translation
/// error, which mappers report through `SyncError::Mapping`.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingResult {
    /// A usable target representation.
    Mapped(RecordMap),
    /// Nothing worth writing.
    Empty,
}

impl MappingResult {
    /// Wrap a record, treating an empty map as no translation.
    #[must_use]
    pub fn from_record(record: RecordMap) -> Self {
        if record.is_empty() {
            Self::Empty
        } else {
            Self::Mapped(record)
        }
    }

    /// Returns true when there is nothing to write.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Borrow the mapped record, if any.
    #[must_use]
    pub const fn record(&self) -> Option<&RecordMap> {
        match self {
            Self::Mapped(record) => Some(record),
            Self::Empty => None,
        }
    }
}

/// Cross-references created during the current invocation.
///
/// Lives for exactly one `process()` call and is never persisted. Used only
/// to stop a record written by one half of a two-way run from being echoed
/// back by the other half.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    imported: HashMap<RemoteId, LocalId>,
    exported: HashMap<LocalId, RemoteId>,
}

impl RunState {
    /// Create an empty run state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that a remote record was written locally.
    pub fn record_import(&mut self, remote_id: RemoteId, local_id: LocalId) {
        self.imported.insert(remote_id, local_id);
    }

    /// Remember that a local record was written remotely.
    pub fn record_export(&mut self, local_id: LocalId, remote_id: RemoteId) {
        self.exported.insert(local_id, remote_id);
    }

    /// Whether this remote id was imported earlier in the run.
    #[must_use]
    pub fn was_imported(&self, remote_id: RemoteId) -> bool {
        self.imported.contains_key(&remote_id)
    }

    /// Whether this local id was exported earlier in the run.
    #[must_use]
    pub fn was_exported(&self, local_id: LocalId) -> bool {
        self.exported.contains_key(&local_id)
    }

    /// Local id written for a remote id in this run.
    #[must_use]
    pub fn imported_as(&self, remote_id: RemoteId) -> Option<LocalId> {
        self.imported.get(&remote_id).copied()
    }

    /// Remote id written for a local id in this run.
    #[must_use]
    pub fn exported_as(&self, local_id: LocalId) -> Option<RemoteId> {
        self.exported.get(&local_id).copied()
    }

    #[must_use]
    pub fn imported_count(&self) -> usize {
        self.imported.len()
    }

    #[must_use]
    pub fn exported_count(&self) -> usize {
        self.exported.len()
    }
}

/// How a direction's scan ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Source exhausted, cursor closed.
    Closed,
    /// Source or cursor store failed; cursor left at its last advanced id.
    Aborted { reason: String },
}

/// Counters for one direction of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionReport {
    pub direction: ScanDirection,
    /// Pages requested from the source (including the final empty one).
    pub pages: u32,
    /// Records handed to the mapper.
    pub seen: usize,
    /// Records written to the target side.
    pub written: usize,
    /// Records the arbiter declined.
    pub skipped: usize,
    /// Records whose mapping was empty.
    pub empty: usize,
    /// Records whose mapping or write failed.
    pub failed: usize,
    pub outcome: ScanOutcome,
}

impl DirectionReport {
    /// Fresh counters for a direction that has not finished yet.
    #[must_use]
    pub fn new(direction: ScanDirection) -> Self {
        Self {
            direction,
            pages: 0,
            seen: 0,
            written: 0,
            skipped: 0,
            empty: 0,
            failed: 0,
            outcome: ScanOutcome::Closed,
        }
    }

    /// Returns true if the scan reached the end of its source.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outcome == ScanOutcome::Closed
    }
}

/// Result of one `process()` invocation for one entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Correlation id shared by every audit event of the run.
    pub run_id: String,
    pub entity: String,
    pub direction: SyncDirection,
    /// False when the entity is disabled and nothing ran.
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<DirectionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<DirectionReport>,
}

impl RunReport {
    /// Total failed records across both directions.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.import.as_ref().map_or(0, |r| r.failed + r.empty)
            + self.export.as_ref().map_or(0, |r| r.failed + r.empty)
    }

    /// Returns true if any direction aborted.
    #[must_use]
    pub fn aborted(&self) -> bool {
        [&self.import, &self.export]
            .into_iter()
            .flatten()
            .any(|r| !r.is_closed())
    }
}

/// Errors raised inside a sync run.
///
/// The engine never propagates these out of `process()`; they are logged and
/// folded into the `RunReport`.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Translation produced no usable target representation.
    #[error("Empty mapping for {entity} record {id}")]
    MappingEmpty { entity: String, id: i64 },

    /// Translation itself failed.
    #[error("Mapping failed: {0}")]
    Mapping(String),

    /// Create/update on either side failed.
    #[error("Write to {side} failed: {message}")]
    RecordWrite { side: &'static str, message: String },

    /// The page source could not be read.
    #[error("Page fetch failed: {0}")]
    PageFetch(String),

    /// The cursor store could not be read or written.
    #[error("Cursor store failed: {0}")]
    Cursor(String),

    /// Remote API call failed.
    #[error("Remote API error: {0}")]
    Remote(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No local table / mapper exists for the entity.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),
}

impl SyncError {
    /// Whether the error ends the current direction's scan.
    ///
    /// Everything else is isolated to the record being processed.
    #[must_use]
    pub const fn is_fatal_to_scan(&self) -> bool {
        matches!(self, Self::PageFetch(_) | Self::Cursor(_))
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
