//! Local store collaborator.
//!
//! The engine reads and writes the local side through [`LocalStore`]. Reads
//! are expressed as a [`LocalQuery`]: a field projection, a change-time
//! window, an id lower bound for resumed scans and limit/offset paging.

use chrono::{DateTime, Utc};

use crate::sync::types::{LocalId, RecordMap, RemoteId, SyncResult};

/// A filtered, paged read of one entity table, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalQuery {
    /// Columns to project. Empty means every readable column.
    pub fields: Vec<String>,
    /// Only records changed strictly before this instant.
    pub modified_before: Option<DateTime<Utc>>,
    /// Only records changed strictly after this instant.
    pub modified_after: Option<DateTime<Utc>>,
    /// Only records with an id strictly greater than this.
    pub after_id: Option<LocalId>,
    pub limit: Option<u32>,
    pub offset: u64,
}

impl LocalQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn modified_before(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.modified_before = at;
        self
    }

    #[must_use]
    pub const fn modified_after(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.modified_after = at;
        self
    }

    #[must_use]
    pub const fn after_id(mut self, id: Option<LocalId>) -> Self {
        self.after_id = id;
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
}

/// Narrow interface to the local record store.
pub trait LocalStore {
    /// Run a query and return `(id, record)` pairs in id order.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Database` if the query fails, or
    /// `SyncError::UnknownEntity` if the entity has no table.
    fn query(&self, entity: &str, query: &LocalQuery) -> SyncResult<Vec<(LocalId, RecordMap)>>;

    /// Find the local record correlated to a remote id.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Database` if the lookup fails.
    fn find_by_remote_id(&self, entity: &str, remote_id: RemoteId) -> SyncResult<Option<LocalId>>;

    /// Create (`id == None`) or update a record and return its id.
    ///
    /// Writing the same content twice with the returned id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::RecordWrite` if the write is rejected.
    fn upsert(&mut self, entity: &str, id: Option<LocalId>, record: &RecordMap)
    -> SyncResult<LocalId>;

    /// Store the remote id correlated to a local record.
    ///
    /// Does not count as a change of the record.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::RecordWrite` if the write is rejected.
    fn set_remote_id(&mut self, entity: &str, id: LocalId, remote_id: RemoteId) -> SyncResult<()>;
}
