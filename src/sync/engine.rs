//! The sync engine.
//!
//! Drives the import scan (remote → local) and the export scan
//! (local → remote) for one entity type. Each scan:
//!
//! 1. loads its cursor and resets it if fresh,
//! 2. fetches pages until one comes back shorter than the limit,
//! 3. maps, arbitrates and writes every record, advancing the cursor after
//!    each one whether or not it was written,
//! 4. closes the cursor when the source is exhausted.
//!
//! A failing record is logged and skipped. A failing page fetch or cursor
//! write ends the scan without closing the cursor, so the next run resumes
//! where this one stopped. Nothing escapes [`SyncEngine::process`]: the
//! outcome is the returned [`RunReport`] plus the audit log.

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::EntitySettings;
use crate::remote::RemoteApi;
use crate::sync::arbiter::ConflictArbiter;
use crate::sync::audit::{AuditEvent, AuditLogger, LOG_CATEGORY};
use crate::sync::cursor::{CursorStore, ScanCursor, ScanKey};
use crate::sync::fetcher::{LocalPageFetcher, RemotePageFetcher};
use crate::sync::local::LocalStore;
use crate::sync::mapper::RecordMapper;
use crate::sync::types::{
    DirectionReport, LocalId, MappingResult, RecordMap, RemoteId, RunReport, RunState,
    ScanDirection, ScanOutcome, SyncError, SyncResult,
};

/// What happened to one record.
enum RecordOutcome {
    Written,
    Skipped,
    Empty,
    Failed,
}

/// Orchestrates one entity type's sync.
///
/// `S` is the local side: it stores both the entity records and the scan
/// cursors.
pub struct SyncEngine<'a, S> {
    store: &'a mut S,
    remote: &'a dyn RemoteApi,
    mapper: &'a dyn RecordMapper,
    audit: &'a mut dyn AuditLogger,
    settings: EntitySettings,
    arbiter: ConflictArbiter,
    log_all: bool,
    run_id: String,
}

impl<'a, S: LocalStore + CursorStore> SyncEngine<'a, S> {
    /// Create an engine with a fresh run id.
    ///
    /// A page size of zero is raised to one.
    pub fn new(
        store: &'a mut S,
        remote: &'a dyn RemoteApi,
        mapper: &'a dyn RecordMapper,
        audit: &'a mut dyn AuditLogger,
        mut settings: EntitySettings,
    ) -> Self {
        if settings.limit == 0 {
            warn!(entity = mapper.entity(), "Page size 0 is not usable, using 1");
            settings.limit = 1;
        }
        Self {
            store,
            remote,
            mapper,
            audit,
            arbiter: ConflictArbiter::new(settings.master),
            settings,
            log_all: false,
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Enable per-record and scan start/end audit events.
    #[must_use]
    pub const fn log_all(mut self, log_all: bool) -> Self {
        self.log_all = log_all;
        self
    }

    /// Use a caller-chosen run id for the audit log.
    #[must_use]
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Run every configured direction: import first, then export.
    ///
    /// A disabled entity produces an inactive report and touches nothing.
    pub fn process(&mut self) -> RunReport {
        let mut report = RunReport {
            run_id: self.run_id.clone(),
            entity: self.mapper.entity().to_string(),
            direction: self.settings.direction,
            active: self.settings.enabled,
            import: None,
            export: None,
        };

        if !self.settings.enabled {
            info!(entity = %report.entity, "Entity disabled, skipping sync");
            return report;
        }

        let mut run = RunState::new();
        if self.settings.direction.runs_import() {
            report.import = Some(self.import(&mut run));
        }
        if self.settings.direction.runs_export() {
            report.export = Some(self.export(&mut run));
        }
        report
    }

    /// Remote → local scan.
    pub fn import(&mut self, run: &mut RunState) -> DirectionReport {
        let key = ScanKey::import(self.mapper.entity());
        let mut report = DirectionReport::new(ScanDirection::Import);

        let result = self.init_scan(&key).and_then(|cursor| {
            self.audit_verbose(
                &format!("Start import {}", self.mapper.label()),
                json!({ "lastScan": cursor }),
            );
            let fetcher = RemotePageFetcher::new(self.mapper.remote_resource(), &cursor);
            self.scan(
                &key,
                &cursor,
                &mut report,
                |engine, page, limit| fetcher.fetch_page(engine.remote, page, limit),
                |engine, id, record| engine.import_record(run, id, &record),
            )
        });

        self.finish_scan(&mut report, result, &format!("Import {}", self.mapper.entity()));
        self.audit_verbose(&format!("End import {}", self.mapper.entity()), Value::Null);
        report
    }

    /// Local → remote scan.
    pub fn export(&mut self, run: &mut RunState) -> DirectionReport {
        let key = ScanKey::export(self.mapper.entity());
        let mut report = DirectionReport::new(ScanDirection::Export);

        let result = self.init_scan(&key).and_then(|cursor| {
            self.audit_verbose(
                &format!("Start export {}", self.mapper.label()),
                json!({ "lastScan": cursor }),
            );
            let fetcher =
                LocalPageFetcher::new(self.mapper.entity(), self.mapper.local_fields(), &cursor);
            self.scan(
                &key,
                &cursor,
                &mut report,
                |engine, page, limit| fetcher.fetch_page(&*engine.store, page, limit),
                |engine, id, record| engine.export_record(run, id, &record),
            )
        });

        self.finish_scan(&mut report, result, &format!("Export {}", self.mapper.entity()));
        self.audit_verbose(&format!("End export {}", self.mapper.label()), Value::Null);
        report
    }

    /// Load the cursor, resetting it first if it is fresh.
    fn init_scan(&mut self, key: &ScanKey) -> SyncResult<ScanCursor> {
        let cursor = self.store.last_scan(key)?;
        if !cursor.is_fresh() {
            info!(key = %key, run_id = cursor.run_id, "Resuming scan");
            return Ok(cursor);
        }
        self.store.reset(key)?;
        let cursor = self.store.last_scan(key)?;
        info!(key = %key, start = ?cursor.start_date, end = ?cursor.end_date, "Starting scan");
        Ok(cursor)
    }

    /// Page loop shared by both directions.
    fn scan<F, H>(
        &mut self,
        key: &ScanKey,
        cursor: &ScanCursor,
        report: &mut DirectionReport,
        mut fetch: F,
        mut handle: H,
    ) -> SyncResult<()>
    where
        F: FnMut(&mut Self, u32, u32) -> SyncResult<Vec<(i64, RecordMap)>>,
        H: FnMut(&mut Self, i64, RecordMap) -> RecordOutcome,
    {
        let limit = self.settings.limit;
        let mut page_index = 0;

        loop {
            let rows = fetch(self, page_index, limit)?;
            report.pages += 1;
            let count = rows.len();
            debug!(key = %key, page = page_index, count, "Fetched page");

            for (id, record) in rows {
                report.seen += 1;
                match handle(self, id, record) {
                    RecordOutcome::Written => report.written += 1,
                    RecordOutcome::Skipped => report.skipped += 1,
                    RecordOutcome::Empty => report.empty += 1,
                    RecordOutcome::Failed => report.failed += 1,
                }
                self.store.advance(key, id)?;
            }

            page_index += 1;
            if count == 0 || count < limit as usize {
                self.store.close(key, cursor.start_date)?;
                return Ok(());
            }
        }
    }

    fn finish_scan(&mut self, report: &mut DirectionReport, result: SyncResult<()>, label: &str) {
        match result {
            Ok(()) => {
                report.outcome = ScanOutcome::Closed;
                info!(
                    direction = %report.direction,
                    pages = report.pages,
                    seen = report.seen,
                    written = report.written,
                    skipped = report.skipped,
                    failed = report.failed + report.empty,
                    "Scan closed"
                );
            }
            Err(e) => {
                self.audit_error(label, Value::Null, &e);
                report.outcome = ScanOutcome::Aborted {
                    reason: e.to_string(),
                };
            }
        }
    }

    fn import_record(
        &mut self,
        run: &mut RunState,
        remote_id: RemoteId,
        source: &RecordMap,
    ) -> RecordOutcome {
        let label = format!("Import {}", self.mapper.label());

        let (outcome, mapped) = match self.mapper.to_local(source) {
            Ok(MappingResult::Mapped(mapped)) => {
                let outcome = match self.write_import(run, remote_id, &mapped) {
                    Ok(true) => RecordOutcome::Written,
                    Ok(false) => RecordOutcome::Skipped,
                    Err(e) => {
                        self.audit_error(&label, json!({ "YF": mapped, "API": source }), &e);
                        RecordOutcome::Failed
                    }
                };
                (outcome, Some(mapped))
            }
            Ok(MappingResult::Empty) => {
                let e = SyncError::MappingEmpty {
                    entity: self.mapper.entity().to_string(),
                    id: remote_id,
                };
                self.audit_error(&label, json!({ "API": source }), &e);
                (RecordOutcome::Empty, None)
            }
            Err(e) => {
                self.audit_error(&label, json!({ "API": source }), &e);
                (RecordOutcome::Failed, None)
            }
        };

        self.audit_verbose(
            &label,
            json!({
                "API": source,
                "YF": mapped.unwrap_or_default(),
                "imported": u8::from(run.was_imported(remote_id)),
            }),
        );
        outcome
    }

    fn write_import(
        &mut self,
        run: &mut RunState,
        remote_id: RemoteId,
        mapped: &RecordMap,
    ) -> SyncResult<bool> {
        let existing = self.mapper.resolve_local_id(&*self.store, remote_id)?;
        let verdict = self.arbiter.allow_import(run, existing);
        if !verdict.allows_write() {
            debug!(remote_id, ?existing, verdict = verdict.as_str(), "Import skipped");
            return Ok(false);
        }

        let local_id = self.mapper.upsert_local(&mut *self.store, mapped, existing)?;
        run.record_import(remote_id, local_id);
        debug!(remote_id, local_id, verdict = verdict.as_str(), "Imported");
        Ok(true)
    }

    fn export_record(
        &mut self,
        run: &mut RunState,
        local_id: LocalId,
        source: &RecordMap,
    ) -> RecordOutcome {
        let label = format!("Export {}", self.mapper.label());

        let (outcome, mapped) = match self.mapper.to_remote(source) {
            Ok(MappingResult::Mapped(mapped)) => {
                let outcome = match self.write_export(run, local_id, source, &mapped) {
                    Ok(true) => RecordOutcome::Written,
                    Ok(false) => RecordOutcome::Skipped,
                    Err(e) => {
                        self.audit_error(&label, json!({ "YF": source, "API": mapped }), &e);
                        RecordOutcome::Failed
                    }
                };
                (outcome, Some(mapped))
            }
            Ok(MappingResult::Empty) => {
                let e = SyncError::MappingEmpty {
                    entity: self.mapper.entity().to_string(),
                    id: local_id,
                };
                self.audit_error(&label, json!({ "YF": source }), &e);
                (RecordOutcome::Empty, None)
            }
            Err(e) => {
                self.audit_error(&label, json!({ "YF": source }), &e);
                (RecordOutcome::Failed, None)
            }
        };

        self.audit_verbose(
            &label,
            json!({
                "YF": source,
                "API": mapped.unwrap_or_default(),
                "exported": u8::from(run.was_exported(local_id)),
            }),
        );
        outcome
    }

    fn write_export(
        &mut self,
        run: &mut RunState,
        local_id: LocalId,
        source: &RecordMap,
        mapped: &RecordMap,
    ) -> SyncResult<bool> {
        let existing = self.mapper.correlated_remote_id(source);
        let verdict = self.arbiter.allow_export(run, existing);
        if !verdict.allows_write() {
            debug!(local_id, ?existing, verdict = verdict.as_str(), "Export skipped");
            return Ok(false);
        }

        let remote_id =
            self.mapper
                .upsert_remote(self.remote, &mut *self.store, local_id, existing, mapped)?;
        run.record_export(local_id, remote_id);
        debug!(local_id, remote_id, verdict = verdict.as_str(), "Exported");
        Ok(true)
    }

    fn audit_verbose(&mut self, label: &str, context: Value) {
        if self.log_all {
            self.audit
                .log(&self.run_id, &AuditEvent::new(label).with_context(context));
        }
    }

    /// Log a failure to the audit sink and the process-wide error log.
    fn audit_error(&mut self, label: &str, context: Value, err: &SyncError) {
        error!(
            category = LOG_CATEGORY,
            label,
            fatal = err.is_fatal_to_scan(),
            error = %err,
            "Error during sync"
        );
        self.audit.log(
            &self.run_id,
            &AuditEvent::new(label).with_context(context).with_error(err),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::{record, StubRemote};
    use crate::storage::SqliteStorage;
    use crate::sync::audit::MemoryAudit;
    use crate::sync::cursor::MemoryCursorStore;
    use crate::sync::local::LocalQuery;
    use crate::sync::orders::OrderMapper;
    use crate::sync::SyncDirection;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn settings(direction: SyncDirection, limit: u32, master: bool) -> EntitySettings {
        EntitySettings {
            enabled: true,
            direction,
            limit,
            master,
        }
    }

    fn woo(id: i64, status: &str) -> Value {
        json!({"id": id, "status": status, "total": "10.00", "currency": "EUR"})
    }

    /// Move every local order's change time an hour into the past.
    fn backdate_orders(storage: &SqliteStorage) {
        let past = (Utc::now() - Duration::hours(1)).timestamp_millis();
        storage
            .conn()
            .execute("UPDATE orders SET modified_at = ?1", [past])
            .unwrap();
    }

    fn seed_local(storage: &mut SqliteStorage, status: &str, woocommerce_id: Option<i64>) -> LocalId {
        let mut order = record(json!({"status": status}));
        if let Some(id) = woocommerce_id {
            order.insert("woocommerce_id".into(), json!(id));
        }
        let id = storage.upsert("orders", None, &order).unwrap();
        backdate_orders(storage);
        id
    }

    fn seed_cursor(
        storage: &SqliteStorage,
        key: &str,
        run_id: i64,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) {
        storage
            .conn()
            .execute(
                "INSERT INTO sync_scans (key, run_id, start_date, end_date, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0)",
                rusqlite::params![
                    key,
                    run_id,
                    start.map(|d| d.timestamp_millis()),
                    end.map(|d| d.timestamp_millis())
                ],
            )
            .unwrap();
    }

    fn query_param(api: &StubRemote, name: &str) -> Option<String> {
        api.last_query()?
            .params
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    fn local_orders(storage: &SqliteStorage) -> Vec<(LocalId, RecordMap)> {
        storage.query("orders", &LocalQuery::new()).unwrap()
    }

    /// Order mapper that fails to translate one remote id.
    struct FlakyMapper {
        inner: OrderMapper,
        fail_id: RemoteId,
    }

    impl RecordMapper for FlakyMapper {
        fn entity(&self) -> &str {
            self.inner.entity()
        }
        fn label(&self) -> &str {
            self.inner.label()
        }
        fn remote_resource(&self) -> &str {
            self.inner.remote_resource()
        }
        fn remote_id_field(&self) -> &str {
            self.inner.remote_id_field()
        }
        fn local_fields(&self) -> &[&str] {
            self.inner.local_fields()
        }
        fn to_local(&self, remote: &RecordMap) -> SyncResult<MappingResult> {
            if remote["id"] == self.fail_id {
                return Err(SyncError::Mapping("unsupported line item".into()));
            }
            self.inner.to_local(remote)
        }
        fn to_remote(&self, local: &RecordMap) -> SyncResult<MappingResult> {
            self.inner.to_remote(local)
        }
    }

    /// Local store whose queries fail.
    struct BrokenQueryStore(SqliteStorage);

    impl LocalStore for BrokenQueryStore {
        fn query(&self, _entity: &str, _query: &LocalQuery) -> SyncResult<Vec<(LocalId, RecordMap)>> {
            Err(SyncError::Database("disk I/O error".into()))
        }
        fn find_by_remote_id(&self, entity: &str, remote_id: RemoteId) -> SyncResult<Option<LocalId>> {
            self.0.find_by_remote_id(entity, remote_id)
        }
        fn upsert(&mut self, entity: &str, id: Option<LocalId>, record: &RecordMap) -> SyncResult<LocalId> {
            self.0.upsert(entity, id, record)
        }
        fn set_remote_id(&mut self, entity: &str, id: LocalId, remote_id: RemoteId) -> SyncResult<()> {
            self.0.set_remote_id(entity, id, remote_id)
        }
    }

    impl CursorStore for BrokenQueryStore {
        fn last_scan(&self, key: &ScanKey) -> SyncResult<ScanCursor> {
            self.0.last_scan(key)
        }
        fn reset(&mut self, key: &ScanKey) -> SyncResult<()> {
            self.0.reset(key)
        }
        fn advance(&mut self, key: &ScanKey, last_id: i64) -> SyncResult<()> {
            self.0.advance(key, last_id)
        }
        fn close(&mut self, key: &ScanKey, start_date: Option<DateTime<Utc>>) -> SyncResult<()> {
            self.0.close(key, start_date)
        }
    }

    /// SQLite records with cursors kept in memory.
    struct SplitStore {
        local: SqliteStorage,
        cursors: MemoryCursorStore,
    }

    impl LocalStore for SplitStore {
        fn query(&self, entity: &str, query: &LocalQuery) -> SyncResult<Vec<(LocalId, RecordMap)>> {
            self.local.query(entity, query)
        }
        fn find_by_remote_id(&self, entity: &str, remote_id: RemoteId) -> SyncResult<Option<LocalId>> {
            self.local.find_by_remote_id(entity, remote_id)
        }
        fn upsert(&mut self, entity: &str, id: Option<LocalId>, record: &RecordMap) -> SyncResult<LocalId> {
            self.local.upsert(entity, id, record)
        }
        fn set_remote_id(&mut self, entity: &str, id: LocalId, remote_id: RemoteId) -> SyncResult<()> {
            self.local.set_remote_id(entity, id, remote_id)
        }
    }

    impl CursorStore for SplitStore {
        fn last_scan(&self, key: &ScanKey) -> SyncResult<ScanCursor> {
            self.cursors.last_scan(key)
        }
        fn reset(&mut self, key: &ScanKey) -> SyncResult<()> {
            self.cursors.reset(key)
        }
        fn advance(&mut self, key: &ScanKey, last_id: i64) -> SyncResult<()> {
            self.cursors.advance(key, last_id)
        }
        fn close(&mut self, key: &ScanKey, start_date: Option<DateTime<Utc>>) -> SyncResult<()> {
            self.cursors.close(key, start_date)
        }
    }

    #[test]
    fn test_two_way_short_second_page_closes_import() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let api = StubRemote::with_pages(vec![
            vec![woo(1, "processing"), woo(2, "completed")],
            vec![woo(3, "pending")],
        ]);
        let mut audit = MemoryAudit::new();

        let report = SyncEngine::new(
            &mut storage,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::TwoWay, 2, false),
        )
        .process();

        assert_eq!(api.fetched_pages(), vec![1, 2]);
        let import = report.import.unwrap();
        assert_eq!(import.pages, 2);
        assert_eq!(import.written, 3);
        assert!(import.is_closed());

        let cursor = storage.last_scan(&ScanKey::import("orders")).unwrap();
        assert!(cursor.is_fresh());
        assert_eq!(cursor.end_date, cursor.start_date);
        assert_eq!(local_orders(&storage).len(), 3);

        // Records imported by this run are not echoed back.
        assert!(report.export.unwrap().is_closed());
        assert!(api.created().is_empty());
        assert!(api.updated().is_empty());
        assert!(audit.errors().is_empty());
    }

    #[test]
    fn test_full_page_triggers_next_fetch() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let api = StubRemote::with_pages(vec![vec![woo(1, "pending"), woo(2, "pending")]]);
        let mut audit = MemoryAudit::new();

        let mut engine = SyncEngine::new(
            &mut storage,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::ImportOnly, 2, false),
        );
        let report = engine.import(&mut RunState::new());

        assert_eq!(api.fetched_pages(), vec![1, 2]);
        assert_eq!(report.pages, 2);
        assert_eq!(report.seen, 2);
        assert!(report.is_closed());
    }

    #[test]
    fn test_fresh_cursor_is_reset_before_paging() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let previous = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        seed_cursor(&storage, "import_orders", 0, Some(previous), Some(previous));
        let api = StubRemote::empty();
        let mut audit = MemoryAudit::new();

        SyncEngine::new(
            &mut storage,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::ImportOnly, 10, false),
        )
        .process();

        assert_eq!(
            query_param(&api, "modified_after").as_deref(),
            Some("2024-03-01T08:00:00")
        );
        let cursor = storage.last_scan(&ScanKey::import("orders")).unwrap();
        assert!(cursor.start_date.unwrap() > previous);
    }

    #[test]
    fn test_interrupted_scan_resumes_in_same_window() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap();
        seed_cursor(&storage, "import_orders", 5, Some(start), Some(end));
        let api = StubRemote::empty();
        let mut audit = MemoryAudit::new();

        SyncEngine::new(
            &mut storage,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::ImportOnly, 10, false),
        )
        .process();

        assert_eq!(
            query_param(&api, "modified_after").as_deref(),
            Some("2024-03-01T08:00:00")
        );
        assert_eq!(
            query_param(&api, "modified_before").as_deref(),
            Some("2024-03-02T08:00:00")
        );
        let cursor = storage.last_scan(&ScanKey::import("orders")).unwrap();
        assert_eq!(cursor.start_date, Some(start));
        assert_eq!(cursor.end_date, Some(start));
        assert_eq!(cursor.run_id, 0);
    }

    #[test]
    fn test_failing_records_are_isolated() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let api = StubRemote::with_pages(vec![vec![
            woo(1, "pending"),
            woo(2, "pending"),
            woo(3, "checkout-draft"),
            woo(4, "completed"),
        ]]);
        let mapper = FlakyMapper {
            inner: OrderMapper,
            fail_id: 2,
        };
        let mut audit = MemoryAudit::new();

        let report = SyncEngine::new(
            &mut storage,
            &api,
            &mapper,
            &mut audit,
            settings(SyncDirection::ImportOnly, 10, false),
        )
        .process();

        let import = report.import.as_ref().unwrap();
        assert_eq!(import.seen, 4);
        assert_eq!(import.written, 2);
        assert_eq!(import.failed, 1);
        assert_eq!(import.empty, 1);
        assert!(import.is_closed());
        assert_eq!(report.failures(), 2);

        let remote_ids: Vec<i64> = local_orders(&storage)
            .iter()
            .map(|(_, r)| r["woocommerce_id"].as_i64().unwrap())
            .collect();
        assert_eq!(remote_ids, vec![1, 4]);

        let errors = audit.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.label == "Import order"));
        assert_eq!(errors[0].context["API"]["id"], 2);
    }

    #[test]
    fn test_fetch_failure_leaves_cursor_at_last_record() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let api = StubRemote::with_pages(vec![vec![
            woo(11, "pending"),
            woo(12, "pending"),
            woo(13, "pending"),
        ]])
        .fail_on_page(2);
        let mut audit = MemoryAudit::new();

        let report = SyncEngine::new(
            &mut storage,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::TwoWay, 3, false),
        )
        .process();

        let import = report.import.as_ref().unwrap();
        assert!(matches!(import.outcome, ScanOutcome::Aborted { .. }));
        assert_eq!(import.written, 3);
        assert!(report.aborted());
        // The export half still runs.
        assert!(report.export.as_ref().unwrap().is_closed());

        let cursor = storage.last_scan(&ScanKey::import("orders")).unwrap();
        assert_eq!(cursor.run_id, 13);
        assert!(!cursor.is_fresh());
        assert_ne!(cursor.end_date, cursor.start_date);

        let errors = audit.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].label, "Import orders");
    }

    #[test]
    fn test_import_of_correlated_record_respects_master() {
        for (master, expected_status, written) in [(false, "new", 0), (true, "completed", 1)] {
            let mut storage = SqliteStorage::open_memory().unwrap();
            seed_local(&mut storage, "new", Some(10));
            let api = StubRemote::with_pages(vec![vec![woo(10, "completed")]]);
            let mut audit = MemoryAudit::new();

            let report = SyncEngine::new(
                &mut storage,
                &api,
                &OrderMapper,
                &mut audit,
                settings(SyncDirection::ImportOnly, 10, master),
            )
            .process();

            let import = report.import.unwrap();
            assert_eq!(import.written, written, "master = {master}");
            assert_eq!(import.skipped, 1 - written, "master = {master}");
            let orders = local_orders(&storage);
            assert_eq!(orders.len(), 1);
            assert_eq!(orders[0].1["status"], expected_status);
        }
    }

    #[test]
    fn test_export_skips_record_imported_in_same_run() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let api = StubRemote::with_pages(vec![vec![woo(5, "completed")]]);
        let mapper = OrderMapper;
        let mut audit = MemoryAudit::new();
        let mut run = RunState::new();
        let policy = settings(SyncDirection::TwoWay, 10, false);

        SyncEngine::new(&mut storage, &api, &mapper, &mut audit, policy).import(&mut run);
        backdate_orders(&storage);
        let local_id = storage.find_by_remote_id("orders", 5).unwrap().unwrap();

        let export =
            SyncEngine::new(&mut storage, &api, &mapper, &mut audit, policy).export(&mut run);

        assert_eq!(export.seen, 1);
        assert_eq!(export.skipped, 1);
        assert_eq!(export.written, 0);
        assert!(!run.was_exported(local_id));
        assert!(api.created().is_empty());
        assert!(api.updated().is_empty());
    }

    #[test]
    fn test_export_creates_and_correlates() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let first = seed_local(&mut storage, "in_progress", None);
        let second = seed_local(&mut storage, "completed", None);
        let api = StubRemote::empty();
        let mut audit = MemoryAudit::new();
        let policy = settings(SyncDirection::ExportOnly, 10, false);

        let report =
            SyncEngine::new(&mut storage, &api, &OrderMapper, &mut audit, policy).process();

        let export = report.export.unwrap();
        assert!(report.import.is_none());
        assert_eq!(export.written, 2);
        assert!(export.is_closed());

        let created = api.created();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0]["status"], "processing");
        let first_remote = created[0]["id"].as_i64().unwrap();
        assert_eq!(storage.find_by_remote_id("orders", first_remote).unwrap(), Some(first));
        assert_eq!(storage.entity_counts("orders").unwrap().correlated, 2);
        assert!(second > first);

        // Storing the correlation is not a change: the next window is empty.
        let again =
            SyncEngine::new(&mut storage, &api, &OrderMapper, &mut audit, policy).process();
        assert_eq!(again.export.unwrap().seen, 0);
        assert_eq!(api.created().len(), 2);
    }

    #[test]
    fn test_export_updates_correlated_record_when_local_is_master() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        seed_local(&mut storage, "cancelled", Some(77));
        let api = StubRemote::empty();
        let mut audit = MemoryAudit::new();

        let report = SyncEngine::new(
            &mut storage,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::ExportOnly, 10, false),
        )
        .process();

        assert_eq!(report.export.unwrap().written, 1);
        assert!(api.created().is_empty());
        let updated = api.updated();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].0, 77);
        assert_eq!(updated[0].1["status"], "cancelled");
    }

    #[test]
    fn test_export_of_correlated_record_when_remote_is_master() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        seed_local(&mut storage, "cancelled", Some(77));
        let api = StubRemote::empty();
        let mut audit = MemoryAudit::new();

        let report = SyncEngine::new(
            &mut storage,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::ExportOnly, 10, true),
        )
        .process();

        assert_eq!(report.export.unwrap().skipped, 1);
        assert!(api.updated().is_empty());
    }

    #[test]
    fn test_rejected_remote_writes_are_isolated() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        seed_local(&mut storage, "new", None);
        seed_local(&mut storage, "completed", None);
        let api = StubRemote::empty().reject_writes();
        let mut audit = MemoryAudit::new();

        let report = SyncEngine::new(
            &mut storage,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::ExportOnly, 10, false),
        )
        .process();

        let export = report.export.unwrap();
        assert_eq!(export.failed, 2);
        assert!(export.is_closed());
        assert_eq!(storage.entity_counts("orders").unwrap().correlated, 0);

        let errors = audit.errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].label, "Export order");
        assert_eq!(errors[0].context["YF"]["status"], "new");
        assert_eq!(errors[0].context["API"]["status"], "pending");
    }

    #[test]
    fn test_local_query_failure_aborts_export() {
        let mut store = BrokenQueryStore(SqliteStorage::open_memory().unwrap());
        let api = StubRemote::empty();
        let mut audit = MemoryAudit::new();

        let report = SyncEngine::new(
            &mut store,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::ExportOnly, 10, false),
        )
        .process();

        let export = report.export.unwrap();
        assert!(matches!(
            &export.outcome,
            ScanOutcome::Aborted { reason } if reason.contains("disk I/O error")
        ));
        let cursor = store.last_scan(&ScanKey::export("orders")).unwrap();
        assert!(!cursor.is_fresh());
        assert_eq!(audit.errors()[0].label, "Export orders");
    }

    #[test]
    fn test_disabled_entity_is_skipped() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let api = StubRemote::with_pages(vec![vec![woo(1, "pending")]]);
        let mut audit = MemoryAudit::new();
        let mut policy = settings(SyncDirection::TwoWay, 10, false);
        policy.enabled = false;

        let report =
            SyncEngine::new(&mut storage, &api, &OrderMapper, &mut audit, policy).process();

        assert!(!report.active);
        assert!(report.import.is_none());
        assert!(report.export.is_none());
        assert!(api.fetched_pages().is_empty());
        assert!(storage.list_scans().unwrap().is_empty());
    }

    #[test]
    fn test_log_all_events() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let api = StubRemote::with_pages(vec![vec![woo(8, "refunded")]]);
        let mut audit = MemoryAudit::new();

        let report = SyncEngine::new(
            &mut storage,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::ImportOnly, 10, false),
        )
        .log_all(true)
        .run_id("run-42")
        .process();

        assert_eq!(report.run_id, "run-42");
        assert_eq!(
            audit.labels(),
            vec!["Start import order", "Import order", "End import orders"]
        );
        let record_event = &audit.events[1];
        assert_eq!(record_event.context["imported"], 1);
        assert_eq!(record_event.context["YF"]["status"], "refunded");
        assert_eq!(record_event.context["API"]["id"], 8);
        assert!(audit.events[0].context["lastScan"]["start_date"].is_string());
    }

    #[test]
    fn test_quiet_run_logs_nothing() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let api = StubRemote::with_pages(vec![vec![woo(8, "refunded")]]);
        let mut audit = MemoryAudit::new();

        SyncEngine::new(
            &mut storage,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::TwoWay, 10, false),
        )
        .process();

        assert!(audit.events.is_empty());
    }

    #[test]
    fn test_directions_share_run_state_with_memory_cursors() {
        let mut local = SqliteStorage::open_memory().unwrap();
        let seeded = seed_local(&mut local, "new", None);
        let mut store = SplitStore {
            local,
            cursors: MemoryCursorStore::new(),
        };
        let api = StubRemote::with_pages(vec![vec![woo(1, "processing")]]);
        let mut audit = MemoryAudit::new();
        let mut run = RunState::new();

        let mut engine = SyncEngine::new(
            &mut store,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::TwoWay, 10, false),
        );
        let import = engine.import(&mut run);
        let export = engine.export(&mut run);

        assert_eq!(import.written, 1);
        assert_eq!(export.written, 1);
        assert!(api.updated().is_empty());

        let orders = local_orders(&store.local);
        let imported = orders
            .iter()
            .find(|(_, r)| r["woocommerce_id"] == 1)
            .map(|(id, _)| *id);
        assert_eq!(run.imported_as(1), imported);
        let exported_remote = orders
            .iter()
            .find(|(id, _)| *id == seeded)
            .and_then(|(_, r)| r["woocommerce_id"].as_i64());
        assert_eq!(run.exported_as(seeded), exported_remote);
        assert!(run.exported_as(imported.unwrap()).is_none());

        for key in [ScanKey::import("orders"), ScanKey::export("orders")] {
            assert!(store.cursors.last_scan(&key).unwrap().is_fresh());
        }
    }

    #[test]
    fn test_zero_limit_still_closes() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let api = StubRemote::empty();
        let mut audit = MemoryAudit::new();

        let report = SyncEngine::new(
            &mut storage,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::TwoWay, 0, false),
        )
        .process();

        let import = report.import.as_ref().unwrap();
        assert_eq!(import.pages, 1);
        assert!(import.is_closed());
        let export = report.export.as_ref().unwrap();
        assert_eq!(export.pages, 1);
        assert!(export.is_closed());
        assert_eq!(api.last_query().unwrap().per_page, 1);
    }

    #[test]
    fn test_zero_limit_pages_one_record_at_a_time() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        seed_local(&mut storage, "new", None);
        let api = StubRemote::empty();
        let mut audit = MemoryAudit::new();

        let report = SyncEngine::new(
            &mut storage,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::ExportOnly, 0, false),
        )
        .process();

        let export = report.export.unwrap();
        assert_eq!(export.pages, 2);
        assert_eq!(export.written, 1);
        assert!(export.is_closed());
    }

    #[test]
    fn test_export_scan_events_use_record_label() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let api = StubRemote::empty();
        let mut audit = MemoryAudit::new();

        SyncEngine::new(
            &mut storage,
            &api,
            &OrderMapper,
            &mut audit,
            settings(SyncDirection::ExportOnly, 10, false),
        )
        .log_all(true)
        .process();

        assert_eq!(audit.labels(), vec!["Start export order", "End export order"]);
    }
}
