//! Page fetchers, one per direction.
//!
//! Both expose `fetch_page(source, page_index, limit)` with a 0-based page
//! index. A page shorter than `limit` (or empty) means the source is
//! exhausted. Any failure of the source comes back as
//! [`SyncError::PageFetch`], which ends the scan.

use chrono::{DateTime, Utc};

use crate::remote::{PageQuery, RemoteApi};
use crate::sync::cursor::ScanCursor;
use crate::sync::local::{LocalQuery, LocalStore};
use crate::sync::types::{LocalId, RecordMap, RemoteId, SyncError, SyncResult};

/// Timestamp format for WooCommerce date filters (with `dates_are_gmt`).
const REMOTE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Pages of remote records for the import scan.
#[derive(Debug, Clone)]
pub struct RemotePageFetcher {
    resource: String,
    modified_after: Option<DateTime<Utc>>,
    modified_before: Option<DateTime<Utc>>,
}

impl RemotePageFetcher {
    /// Fetcher for one scan window.
    #[must_use]
    pub fn new(resource: &str, cursor: &ScanCursor) -> Self {
        Self {
            resource: resource.to_string(),
            modified_after: cursor.end_date,
            modified_before: cursor.start_date,
        }
    }

    /// Query sent with every page: page size, the window and a stable order.
    #[must_use]
    pub fn query(&self, limit: u32) -> PageQuery {
        let mut query = PageQuery::new(limit);
        if let Some(after) = self.modified_after {
            query = query.param("modified_after", after.format(REMOTE_DATE_FORMAT).to_string());
        }
        if let Some(before) = self.modified_before {
            query = query.param("modified_before", before.format(REMOTE_DATE_FORMAT).to_string());
        }
        if self.modified_after.is_some() || self.modified_before.is_some() {
            query = query.param("dates_are_gmt", "true");
        }
        query.param("orderby", "id").param("order", "asc")
    }

    /// Fetch one page. `page_index` 0 is the remote's page 1.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::PageFetch` if the remote call fails.
    pub fn fetch_page(
        &self,
        api: &dyn RemoteApi,
        page_index: u32,
        limit: u32,
    ) -> SyncResult<Vec<(RemoteId, RecordMap)>> {
        api.fetch_page(&self.resource, page_index + 1, &self.query(limit))
            .map_err(|e| SyncError::PageFetch(e.to_string()))
    }
}

/// Pages of local records for the export scan.
#[derive(Debug, Clone)]
pub struct LocalPageFetcher {
    entity: String,
    fields: Vec<String>,
    modified_after: Option<DateTime<Utc>>,
    modified_before: Option<DateTime<Utc>>,
    after_id: Option<LocalId>,
}

impl LocalPageFetcher {
    /// Fetcher for one scan window.
    ///
    /// Records changed before the window opened and after the previous one
    /// did are candidates. A resumed scan skips ids up to the cursor's.
    #[must_use]
    pub fn new(entity: &str, fields: &[&str], cursor: &ScanCursor) -> Self {
        Self {
            entity: entity.to_string(),
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
            modified_after: cursor.end_date,
            modified_before: cursor.start_date,
            after_id: cursor.is_resuming().then_some(cursor.run_id),
        }
    }

    /// Query for one page.
    #[must_use]
    pub fn query(&self, page_index: u32, limit: u32) -> LocalQuery {
        LocalQuery::new()
            .fields(self.fields.iter().cloned())
            .modified_after(self.modified_after)
            .modified_before(self.modified_before)
            .after_id(self.after_id)
            .limit(limit)
            .offset(u64::from(page_index) * u64::from(limit))
    }

    /// Fetch one page.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::PageFetch` if the local query fails.
    pub fn fetch_page(
        &self,
        store: &dyn LocalStore,
        page_index: u32,
        limit: u32,
    ) -> SyncResult<Vec<(LocalId, RecordMap)>> {
        store
            .query(&self.entity, &self.query(page_index, limit))
            .map_err(|e| SyncError::PageFetch(e.to_string()))
    }
}
