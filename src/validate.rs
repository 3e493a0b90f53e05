use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::descriptor::{DedupeStrategy, SourceDescriptor};
use crate::error::Result;
use crate::models::{DedupeKey, StoredRecord};
use crate::pipeline::record_scope;
use crate::store::TableStore;

const WEIGHT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub severity: Severity,
    /// Record name, or empty for set-level findings.
    pub record: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub checked: usize,
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    fn push(&mut self, severity: Severity, record: &str, message: String) {
        self.findings.push(Finding {
            severity,
            record: record.to_string(),
            message,
        });
    }

    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// 0 pass, 1 fail, 2 pass with warnings.
    pub fn exit_code(&self) -> i32 {
        if self.errors() > 0 {
            1
        } else if self.warnings() > 0 {
            2
        } else {
            0
        }
    }
}

pub fn validate_records(records: &[StoredRecord], dedupe: DedupeStrategy) -> ValidationReport {
    let mut report = ValidationReport {
        checked: records.len(),
        ..Default::default()
    };
    if records.is_empty() {
        report.push(Severity::Warning, "", "no records stored for this scope".to_string());
        return report;
    }

    let mut seen: HashSet<DedupeKey> = HashSet::new();
    for r in records {
        let expected = r.amount * r.probability;
        if (r.weighted_amount - expected).abs() > WEIGHT_TOLERANCE {
            report.push(
                Severity::Error,
                &r.name,
                format!(
                    "weighted amount {:.2} != {:.2} x {:.2} ({:.2})",
                    r.weighted_amount, r.amount, r.probability, expected
                ),
            );
        }
        if !(0.0..=1.0).contains(&r.probability) {
            report.push(Severity::Error, &r.name, format!("probability {} outside [0, 1]", r.probability));
        }
        let qualifier = match dedupe {
            DedupeStrategy::NameReference => r.reference.as_deref(),
            DedupeStrategy::NameClient => r.client.as_deref(),
        };
        if !seen.insert(DedupeKey::new(&r.name, qualifier)) {
            report.push(Severity::Error, &r.name, "duplicate record key".to_string());
        }
        if r.amount == 0.0 {
            report.push(Severity::Warning, &r.name, "zero amount".to_string());
        }
        if dedupe == DedupeStrategy::NameReference && r.reference.as_deref().is_none_or(|s| s.trim().is_empty()) {
            report.push(Severity::Warning, &r.name, "no quote/reference number".to_string());
        }
    }
    report
}

/// Load the stored records for a descriptor's scope and check them.
pub fn validate_source(
    store: &dyn TableStore,
    descriptor: &SourceDescriptor,
    fiscal_year: i32,
) -> Result<ValidationReport> {
    let scope = record_scope(descriptor, fiscal_year);
    let rows = store.select(&descriptor.table, scope.filters())?;
    let records = rows
        .into_iter()
        .map(|row| serde_json::from_value::<StoredRecord>(Value::Object(row)))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    log::debug!("{}: loaded {} stored records for {scope}", descriptor.table, records.len());
    Ok(validate_records(&records, descriptor.dedupe))
}
