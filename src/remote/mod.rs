//! Remote API collaborator.
//!
//! The sync core talks to the remote side through [`RemoteApi`]: paged reads
//! of a REST resource plus create/update of single records. Retries and
//! authentication belong to the implementation, not to the engine.
//!
//! - [`http`] - WooCommerce REST implementation over reqwest

pub mod http;
#[cfg(test)]
pub(crate) mod testing;

pub use http::WooCommerceClient;

use crate::sync::{RecordMap, RemoteId, SyncError, SyncResult};

/// Page size and server-side filter for one paged read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageQuery {
    pub per_page: u32,
    /// Extra query parameters, in insertion order.
    pub params: Vec<(String, String)>,
}

impl PageQuery {
    #[must_use]
    pub fn new(per_page: u32) -> Self {
        Self {
            per_page,
            params: Vec::new(),
        }
    }

    /// Add a query parameter.
    #[must_use]
    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    /// All parameters for a given 1-indexed page.
    #[must_use]
    pub fn pairs(&self, page: u32) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), page.to_string()),
            ("per_page".to_string(), self.per_page.to_string()),
        ];
        pairs.extend(self.params.iter().cloned());
        pairs
    }
}

/// Narrow interface to the remote record store.
pub trait RemoteApi {
    /// Fetch one page of a resource. `page` is 1-indexed.
    ///
    /// A page shorter than `query.per_page` (or empty) means the resource is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the request fails or the body is not a
    /// list of records.
    fn fetch_page(
        &self,
        resource: &str,
        page: u32,
        query: &PageQuery,
    ) -> SyncResult<Vec<(RemoteId, RecordMap)>>;

    /// Create a record and return it as stored remotely.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the request is rejected.
    fn create(&self, resource: &str, body: &RecordMap) -> SyncResult<RecordMap>;

    /// Update a record and return it as stored remotely.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the request is rejected.
    fn update(&self, resource: &str, id: RemoteId, body: &RecordMap) -> SyncResult<RecordMap>;
}

/// Read the `id` field of a remote record.
#[must_use]
pub fn remote_id_of(record: &RecordMap) -> Option<RemoteId> {
    match record.get("id")? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Split a JSON list response into `(id, record)` pairs, keeping order.
///
/// # Errors
///
/// Returns `SyncError::Remote` if the body is not an array of objects with
/// an `id`.
pub fn records_from_json(body: serde_json::Value) -> SyncResult<Vec<(RemoteId, RecordMap)>> {
    let serde_json::Value::Array(items) = body else {
        return Err(SyncError::Remote("expected a JSON array of records".into()));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let serde_json::Value::Object(record) = item else {
                return Err(SyncError::Remote(format!("item {index} is not an object")));
            };
            let id = remote_id_of(&record)
                .ok_or_else(|| SyncError::Remote(format!("item {index} has no id")))?;
            Ok((id, record))
        })
        .collect()
}
