use std::fmt;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::store::{Filter, Row, TableStore};

/// The exact set of rows one run owns, e.g. `fiscal_year=2025, source_sheet=Attrition`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    filters: Vec<Filter>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Copy the scope columns onto a row so reads and deletes see the same values.
    fn stamp(&self, row: &mut Row) {
        for f in &self.filters {
            row.insert(f.column.clone(), f.value.clone());
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .filters
            .iter()
            .map(|x| format!("{}={}", x.column, x.value_text()))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub index: usize,
    pub rows: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ReplaceReport {
    pub deleted: usize,
    pub inserted: usize,
    pub failed_batches: Vec<BatchFailure>,
}

impl ReplaceReport {
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty()
    }
}

/// Delete everything in `scope`, then insert `rows` in batches.
///
/// No transaction spans the pair. A failed delete aborts before anything is
/// inserted. A failed batch is logged and the next batch still runs.
pub fn replace_scope(
    store: &dyn TableStore,
    table: &str,
    scope: &Scope,
    rows: Vec<Row>,
    batch_size: usize,
) -> Result<ReplaceReport> {
    let mut report = ReplaceReport {
        deleted: store.delete(table, scope.filters())?,
        ..Default::default()
    };
    log::info!("{table}: deleted {} rows for {scope}", report.deleted);

    let rows: Vec<Row> = rows
        .into_iter()
        .map(|mut r| {
            scope.stamp(&mut r);
            r
        })
        .collect();

    for (index, batch) in rows.chunks(batch_size.max(1)).enumerate() {
        match store.insert(table, batch) {
            Ok(n) => {
                report.inserted += n;
                log::debug!("{table}: batch {} inserted {n} rows", index + 1);
            }
            Err(e) => {
                log::error!("{table}: batch {} ({} rows) failed: {e}", index + 1, batch.len());
                report.failed_batches.push(BatchFailure {
                    index,
                    rows: batch.len(),
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}

pub const AUDIT_TABLE: &str = "sync_audit_log";

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub source: String,
    pub scope: String,
    pub records: usize,
    pub deleted: usize,
    pub inserted: usize,
    pub failed_batches: usize,
    pub dry_run: bool,
    pub ran_at: String,
}

impl AuditEntry {
    pub fn new(source: &str, scope: &Scope, records: usize, report: &ReplaceReport, dry_run: bool) -> Self {
        Self {
            source: source.to_string(),
            scope: scope.to_string(),
            records,
            deleted: report.deleted,
            inserted: report.inserted,
            failed_batches: report.failed_batches.len(),
            dry_run,
            ran_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Best effort: failure is a warning.
pub fn record_audit(store: &dyn TableStore, entry: &AuditEntry) {
    let row = match serde_json::to_value(entry) {
        Ok(Value::Object(map)) => map,
        _ => return,
    };
    if let Err(e) = store.insert(AUDIT_TABLE, &[row]) {
        log::warn!("audit log write failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use serde_json::json;

    use crate::db::SqliteStore;
    use crate::error::SyncError;

    fn row(v: Value) -> Row {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn matches(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| row(json!({"name": format!("Deal {i}"), "score": i as f64 / 10.0})))
            .collect()
    }

    fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    /// Store double that fails on chosen insert calls or on delete.
    #[derive(Default)]
    struct FlakyStore {
        fail_inserts: Vec<usize>,
        fail_delete: bool,
        calls: RefCell<usize>,
        inserted: RefCell<Vec<Row>>,
    }

    impl TableStore for FlakyStore {
        fn select(&self, _: &str, _: &[Filter]) -> Result<Vec<Row>> {
            Ok(self.inserted.borrow().clone())
        }
        fn insert(&self, _: &str, rows: &[Row]) -> Result<usize> {
            let call = *self.calls.borrow();
            *self.calls.borrow_mut() += 1;
            if self.fail_inserts.contains(&call) {
                return Err(SyncError::Store("HTTP 500".into()));
            }
            self.inserted.borrow_mut().extend_from_slice(rows);
            Ok(rows.len())
        }
        fn delete(&self, _: &str, _: &[Filter]) -> Result<usize> {
            if self.fail_delete {
                Err(SyncError::Store("HTTP 503".into()))
            } else {
                Ok(0)
            }
        }
    }

    #[test]
    fn test_scope_display() {
        let scope = Scope::new().with("fiscal_year", 2025).with("source_sheet", "Attrition");
        assert_eq!(scope.to_string(), "fiscal_year=2025, source_sheet=Attrition");
    }

    #[test]
    fn test_replace_is_idempotent() {
        let (_dir, store) = test_store();
        let scope = Scope::new().with("fiscal_year", 2025);

        let first = replace_scope(&store, "burc_pipeline_matches", &scope, matches(7), 3).unwrap();
        assert_eq!(first.inserted, 7);
        let after_first = store.select("burc_pipeline_matches", scope.filters()).unwrap();

        let second = replace_scope(&store, "burc_pipeline_matches", &scope, matches(7), 3).unwrap();
        assert_eq!(second.deleted, 7);
        assert_eq!(second.inserted, 7);
        let after_second = store.select("burc_pipeline_matches", scope.filters()).unwrap();

        let strip = |rows: Vec<Row>| -> Vec<Row> {
            rows.into_iter()
                .map(|mut r| {
                    r.remove("id");
                    r
                })
                .collect()
        };
        assert_eq!(strip(after_first), strip(after_second));
    }

    #[test]
    fn test_replace_leaves_other_scopes_alone() {
        let (_dir, store) = test_store();
        let fy24 = Scope::new().with("fiscal_year", 2024);
        let fy25 = Scope::new().with("fiscal_year", 2025);
        replace_scope(&store, "burc_pipeline_matches", &fy24, matches(2), 100).unwrap();
        replace_scope(&store, "burc_pipeline_matches", &fy25, matches(3), 100).unwrap();
        replace_scope(&store, "burc_pipeline_matches", &fy25, matches(1), 100).unwrap();

        assert_eq!(store.select("burc_pipeline_matches", fy24.filters()).unwrap().len(), 2);
        let left = store.select("burc_pipeline_matches", fy25.filters()).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0]["fiscal_year"], 2025);
    }

    #[test]
    fn test_failed_batch_is_skipped_and_next_batch_runs() {
        let store = FlakyStore {
            fail_inserts: vec![1],
            ..Default::default()
        };
        let scope = Scope::new().with("fiscal_year", 2025);
        let report = replace_scope(&store, "t", &scope, matches(5), 2).unwrap();
        assert_eq!(report.inserted, 3);
        assert_eq!(
            report.failed_batches,
            vec![BatchFailure { index: 1, rows: 2, message: "Store error: HTTP 500".into() }]
        );
        assert!(!report.is_complete());
        let names: Vec<Value> = store.inserted.borrow().iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("Deal 0"), json!("Deal 1"), json!("Deal 4")]);
    }

    #[test]
    fn test_failed_delete_aborts_before_insert() {
        let store = FlakyStore {
            fail_delete: true,
            ..Default::default()
        };
        let scope = Scope::new().with("fiscal_year", 2025);
        assert!(replace_scope(&store, "t", &scope, matches(3), 2).is_err());
        assert!(store.inserted.borrow().is_empty());
    }

    #[test]
    fn test_zero_batch_size_treated_as_one() {
        let store = FlakyStore::default();
        let scope = Scope::new().with("fiscal_year", 2025);
        let report = replace_scope(&store, "t", &scope, matches(3), 0).unwrap();
        assert_eq!(report.inserted, 3);
        assert_eq!(*store.calls.borrow(), 3);
    }

    #[test]
    fn test_audit_is_best_effort() {
        let (_dir, store) = test_store();
        let scope = Scope::new().with("fiscal_year", 2025);
        let report = ReplaceReport { deleted: 1, inserted: 2, failed_batches: vec![] };
        record_audit(&store, &AuditEntry::new("burc-pipeline", &scope, 2, &report, false));
        let rows = store.select(AUDIT_TABLE, &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["scope"], "fiscal_year=2025");
        assert_eq!(rows[0]["dry_run"], 0);

        // a store without the table only warns
        let flaky = FlakyStore { fail_inserts: vec![0], ..Default::default() };
        record_audit(&flaky, &AuditEntry::new("x", &scope, 0, &report, true));
    }
}
