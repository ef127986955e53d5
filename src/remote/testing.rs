//! In-memory remote API for unit tests.

use std::cell::{Cell, RefCell};

use serde_json::Value;

use super::{remote_id_of, PageQuery, RemoteApi};
use crate::sync::{RecordMap, RemoteId, SyncError, SyncResult};

/// Unwrap a JSON object literal into a record.
pub fn record(value: Value) -> RecordMap {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

/// Remote side serving fixed pages and recording every write.
#[derive(Debug)]
pub struct StubRemote {
    pages: Vec<Vec<RecordMap>>,
    fail_page: Option<u32>,
    reject_writes: bool,
    fetches: RefCell<Vec<(u32, PageQuery)>>,
    created: RefCell<Vec<RecordMap>>,
    updated: RefCell<Vec<(RemoteId, RecordMap)>>,
    next_id: Cell<RemoteId>,
}

impl StubRemote {
    /// Serve `pages[0]` as page 1 and so on; later pages are empty.
    pub fn with_pages(pages: Vec<Vec<Value>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|page| page.into_iter().map(record).collect())
                .collect(),
            fail_page: None,
            reject_writes: false,
            fetches: RefCell::new(Vec::new()),
            created: RefCell::new(Vec::new()),
            updated: RefCell::new(Vec::new()),
            next_id: Cell::new(1000),
        }
    }

    pub fn empty() -> Self {
        Self::with_pages(Vec::new())
    }

    /// Fail the request for a 1-indexed page.
    pub fn fail_on_page(mut self, page: u32) -> Self {
        self.fail_page = Some(page);
        self
    }

    /// Reject every create and update.
    pub fn reject_writes(mut self) -> Self {
        self.reject_writes = true;
        self
    }

    pub fn fetched_pages(&self) -> Vec<u32> {
        self.fetches.borrow().iter().map(|(page, _)| *page).collect()
    }

    pub fn last_query(&self) -> Option<PageQuery> {
        self.fetches.borrow().last().map(|(_, q)| q.clone())
    }

    pub fn created(&self) -> Vec<RecordMap> {
        self.created.borrow().clone()
    }

    pub fn updated(&self) -> Vec<(RemoteId, RecordMap)> {
        self.updated.borrow().clone()
    }
}

impl RemoteApi for StubRemote {
    fn fetch_page(
        &self,
        _resource: &str,
        page: u32,
        query: &PageQuery,
    ) -> SyncResult<Vec<(RemoteId, RecordMap)>> {
        self.fetches.borrow_mut().push((page, query.clone()));
        if self.fail_page == Some(page) {
            return Err(SyncError::Remote("503 Service Unavailable".into()));
        }
        let index = usize::try_from(page).unwrap() - 1;
        Ok(self
            .pages
            .get(index)
            .map(|rows| {
                rows.iter()
                    .map(|r| (remote_id_of(r).unwrap(), r.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn create(&self, _resource: &str, body: &RecordMap) -> SyncResult<RecordMap> {
        if self.reject_writes {
            return Err(SyncError::Remote("400 Bad Request".into()));
        }
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let mut stored = body.clone();
        stored.insert("id".into(), Value::from(id));
        self.created.borrow_mut().push(stored.clone());
        Ok(stored)
    }

    fn update(&self, _resource: &str, id: RemoteId, body: &RecordMap) -> SyncResult<RecordMap> {
        if self.reject_writes {
            return Err(SyncError::Remote("400 Bad Request".into()));
        }
        let mut stored = body.clone();
        stored.insert("id".into(), Value::from(id));
        self.updated.borrow_mut().push((id, stored.clone()));
        Ok(stored)
    }
}
