//! Record mapping strategy.
//!
//! A [`RecordMapper`] knows how one entity type looks on both sides. The
//! translations are pure; the write operations go through the collaborators
//! the engine hands in. The provided methods cover the usual correlation
//! scheme (remote id stored in a column of the local record), so a new
//! entity type mostly implements the two translations.

use crate::remote::{remote_id_of, RemoteApi};
use crate::sync::local::LocalStore;
use crate::sync::types::{LocalId, MappingResult, RecordMap, RemoteId, SyncError, SyncResult};

/// Translation and identity rules for one entity type.
pub trait RecordMapper {
    /// Entity name, as used for the local table and cursor keys.
    fn entity(&self) -> &str;

    /// Singular noun for audit labels, e.g. `order`.
    fn label(&self) -> &str;

    /// REST resource path on the remote side.
    fn remote_resource(&self) -> &str;

    /// Local column holding the remote id.
    fn remote_id_field(&self) -> &str;

    /// Local columns the export scan reads.
    fn local_fields(&self) -> &[&str];

    /// Translate a remote record into the local shape.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Mapping` if translation fails outright.
    fn to_local(&self, remote: &RecordMap) -> SyncResult<MappingResult>;

    /// Translate a local record into the remote shape.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Mapping` if translation fails outright.
    fn to_remote(&self, local: &RecordMap) -> SyncResult<MappingResult>;

    /// Remote id a local record is already correlated with.
    fn correlated_remote_id(&self, local: &RecordMap) -> Option<RemoteId> {
        match local.get(self.remote_id_field())? {
            serde_json::Value::Number(n) => n.as_i64().filter(|id| *id != 0),
            serde_json::Value::String(s) => s.parse().ok().filter(|id| *id != 0),
            _ => None,
        }
    }

    /// Local record correlated to a remote id.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the lookup fails.
    fn resolve_local_id(
        &self,
        store: &dyn LocalStore,
        remote_id: RemoteId,
    ) -> SyncResult<Option<LocalId>> {
        store.find_by_remote_id(self.entity(), remote_id)
    }

    /// Create or update the local record.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::RecordWrite` if the store rejects the write.
    fn upsert_local(
        &self,
        store: &mut dyn LocalStore,
        mapped: &RecordMap,
        existing: Option<LocalId>,
    ) -> SyncResult<LocalId> {
        store.upsert(self.entity(), existing, mapped)
    }

    /// Create or update the remote record and store the correlation.
    ///
    /// A local record that already carries a remote id is updated in place,
    /// so repeating the call with the same content touches one remote
    /// record.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::RecordWrite` if either side rejects the write.
    fn upsert_remote(
        &self,
        api: &dyn RemoteApi,
        store: &mut dyn LocalStore,
        local_id: LocalId,
        existing: Option<RemoteId>,
        mapped: &RecordMap,
    ) -> SyncResult<RemoteId> {
        let remote_write_error = |e: SyncError| SyncError::RecordWrite {
            side: "remote",
            message: e.to_string(),
        };

        let remote_id = if let Some(id) = existing {
            let stored = api
                .update(self.remote_resource(), id, mapped)
                .map_err(remote_write_error)?;
            remote_id_of(&stored).unwrap_or(id)
        } else {
            let stored = api
                .create(self.remote_resource(), mapped)
                .map_err(remote_write_error)?;
            remote_id_of(&stored).ok_or_else(|| SyncError::RecordWrite {
                side: "remote",
                message: format!("created {} has no id", self.label()),
            })?
        };

        if existing != Some(remote_id) {
            store.set_remote_id(self.entity(), local_id, remote_id)?;
        }
        Ok(remote_id)
    }
}
