use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::matcher::{match_all, Confidence, Matchable, MatcherConfig};
use crate::models::NormalisedRecord;
use crate::store::{Filter, Row, TableStore};

/// Where the secondary pipeline lives and which columns carry what.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondarySource {
    pub table: String,
    pub id_field: String,
    pub name_field: String,
    pub account_field: String,
    pub amount_field: String,
    /// Column to scope by fiscal year; empty to read the whole table.
    pub fiscal_year_field: String,
}

impl Default for SecondarySource {
    fn default() -> Self {
        Self {
            table: "sales_pipeline_opportunities".to_string(),
            id_field: "id".to_string(),
            name_field: "opportunity_name".to_string(),
            account_field: "account_name".to_string(),
            amount_field: "total_acv".to_string(),
            fiscal_year_field: "fiscal_year".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryRecord {
    pub id: String,
    pub name: String,
    pub account: Option<String>,
    pub amount: Option<f64>,
}

fn text_field(row: &Row, field: &str) -> Option<String> {
    match row.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_field(row: &Row, field: &str) -> Option<f64> {
    match row.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl SecondaryRecord {
    /// `None` for rows without a name.
    pub fn from_row(row: &Row, source: &SecondarySource) -> Option<Self> {
        let name = text_field(row, &source.name_field)?;
        Some(Self {
            id: text_field(row, &source.id_field).unwrap_or_default(),
            name,
            account: text_field(row, &source.account_field),
            amount: number_field(row, &source.amount_field),
        })
    }
}

/// Read the secondary source. A read failure is reported and treated as
/// "no data", so every primary record ends up unmatched.
pub fn load_secondary(store: &dyn TableStore, source: &SecondarySource, fiscal_year: i32) -> Vec<SecondaryRecord> {
    let filters = if source.fiscal_year_field.is_empty() {
        vec![]
    } else {
        vec![Filter::eq(&source.fiscal_year_field, fiscal_year)]
    };
    match store.select(&source.table, &filters) {
        Ok(rows) => rows
            .iter()
            .filter_map(|r| SecondaryRecord::from_row(r, source))
            .collect(),
        Err(e) => {
            log::warn!("could not read {}: {e}; treating as empty", source.table);
            Vec::new()
        }
    }
}

impl Matchable for NormalisedRecord {
    fn match_name(&self) -> &str {
        self.name()
    }
    fn match_account(&self) -> Option<&str> {
        self.client()
    }
    fn match_amount(&self) -> Option<f64> {
        Some(self.amount())
    }
}

impl Matchable for SecondaryRecord {
    fn match_name(&self) -> &str {
        &self.name
    }
    fn match_account(&self) -> Option<&str> {
        self.account.as_deref()
    }
    fn match_amount(&self) -> Option<f64> {
        self.amount
    }
}

/// One line of the reconciliation, owned so it can outlive both inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub name: String,
    pub reference: Option<String>,
    pub amount: f64,
    pub matched_id: Option<String>,
    pub matched_name: Option<String>,
    pub confidence: Option<Confidence>,
    pub score: Option<f64>,
}

#[derive(Debug, Default)]
pub struct Reconciliation {
    pub results: Vec<MatchResult>,
    pub secondary_count: usize,
}

impl Reconciliation {
    pub fn exact(&self) -> usize {
        self.count(Some(Confidence::Exact))
    }

    pub fn fuzzy(&self) -> usize {
        self.count(Some(Confidence::Fuzzy))
    }

    pub fn unmatched(&self) -> usize {
        self.count(None)
    }

    fn count(&self, confidence: Option<Confidence>) -> usize {
        self.results.iter().filter(|r| r.confidence == confidence).count()
    }

    /// Rows for `burc_pipeline_matches`, without the scope columns.
    pub fn to_rows(&self) -> Vec<Row> {
        self.results
            .iter()
            .map(|r| {
                let mut row = Row::new();
                row.insert("name".into(), Value::from(r.name.clone()));
                row.insert("reference".into(), r.reference.clone().into());
                row.insert("matched_id".into(), r.matched_id.clone().into());
                row.insert("matched_name".into(), r.matched_name.clone().into());
                row.insert("confidence".into(), r.confidence.map(|c| c.to_string()).into());
                row.insert("score".into(), r.score.into());
                row
            })
            .collect()
    }
}

pub fn reconcile(
    records: &[NormalisedRecord],
    secondaries: &[SecondaryRecord],
    config: &MatcherConfig,
) -> Reconciliation {
    let results = match_all(records, secondaries, config)
        .into_iter()
        .map(|(record, candidate)| {
            let mut result = MatchResult {
                name: record.name().to_string(),
                reference: record.reference().map(str::to_string),
                amount: record.amount(),
                matched_id: None,
                matched_name: None,
                confidence: None,
                score: None,
            };
            if let Some(c) = candidate {
                result.matched_id = Some(c.secondary.id.clone());
                result.matched_name = Some(c.secondary.name.clone());
                result.confidence = Some(c.confidence);
                result.score = Some((c.score * 10_000.0).round() / 10_000.0);
            }
            result
        })
        .collect();
    Reconciliation {
        results,
        secondary_count: secondaries.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::models::{Provenance, RecordFields};
    use serde_json::json;

    fn record(name: &str, client: &str, amount: f64) -> NormalisedRecord {
        NormalisedRecord::new(RecordFields {
            name: name.into(),
            client: Some(client.into()),
            section: "green".into(),
            forecast_category: Some("Best Case".into()),
            amount,
            probability: 0.9,
            reference: None,
            close_date: None,
            provenance: Provenance {
                source_file: "burc.xlsx".into(),
                source_sheet: "Dial 2".into(),
                source_row: 3,
            },
        })
    }

    fn secondary(id: &str, name: &str, account: &str, amount: f64) -> SecondaryRecord {
        SecondaryRecord {
            id: id.into(),
            name: name.into(),
            account: Some(account.into()),
            amount: Some(amount),
        }
    }

    fn row(v: Value) -> Row {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_from_row_reads_configured_fields() {
        let source = SecondarySource::default();
        let r = SecondaryRecord::from_row(
            &row(json!({"id": 42, "opportunity_name": " Opal Upgrade ", "account_name": "", "total_acv": "1500.5"})),
            &source,
        )
        .unwrap();
        assert_eq!(r.id, "42");
        assert_eq!(r.name, "Opal Upgrade");
        assert_eq!(r.account, None);
        assert_eq!(r.amount, Some(1500.5));
        assert!(SecondaryRecord::from_row(&row(json!({"id": "x"})), &source).is_none());
    }

    #[test]
    fn test_reconcile_counts() {
        let records = vec![
            record("SA Health Renewal", "SA Health", 46000.0),
            record("Sunrise EMR Upgrade", "WA Health", 120000.0),
            record("Something Else", "Nobody", 1.0),
        ];
        let secondaries = vec![
            secondary("s1", "Sunrise EMR Upgrade Phase 2", "WA Health", 120500.0),
            secondary("s2", "sa health renewal", "SA Health", 0.0),
        ];
        let out = reconcile(&records, &secondaries, &MatcherConfig::default());
        assert_eq!(out.exact(), 1);
        assert_eq!(out.fuzzy(), 1);
        assert_eq!(out.unmatched(), 1);
        assert_eq!(out.secondary_count, 2);
        assert_eq!(out.results[0].matched_id.as_deref(), Some("s2"));
        assert_eq!(out.results[1].score, Some(0.92));

        let rows = out.to_rows();
        assert_eq!(rows[0]["confidence"], "exact");
        assert_eq!(rows[2]["matched_id"], Value::Null);
    }

    #[test]
    fn test_load_secondary_scoped_by_year() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("t.db")).unwrap();
        store
            .insert(
                "sales_pipeline_opportunities",
                &[
                    row(json!({"id": "a", "opportunity_name": "Deal A", "fiscal_year": 2025})),
                    row(json!({"id": "b", "opportunity_name": "Deal B", "fiscal_year": 2024})),
                ],
            )
            .unwrap();
        let loaded = load_secondary(&store, &SecondarySource::default(), 2025);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Deal A");
    }

    #[test]
    fn test_read_failure_degrades_to_unmatched() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("t.db")).unwrap();
        let source = SecondarySource {
            table: "no_such_table".into(),
            ..Default::default()
        };
        let loaded = load_secondary(&store, &source, 2025);
        assert!(loaded.is_empty());

        let out = reconcile(&[record("Deal", "X", 1.0)], &loaded, &MatcherConfig::default());
        assert_eq!(out.unmatched(), 1);
    }
}
