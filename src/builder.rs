use std::collections::HashSet;

use crate::classifier::{classify, ClassifiedRow};
use crate::descriptor::{ColumnMap, DedupeStrategy, Field, SourceDescriptor};
use crate::models::{Cell, DedupeKey, NormalisedRecord, Provenance, RecordFields, SourceRow};
use crate::normaliser::{cell_amount, cell_date, scaled};

/// Output of one sheet pass.
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<NormalisedRecord>,
    /// Data rows without a name.
    pub skipped: usize,
    /// Rows under a closed/lost style marker.
    pub excluded: usize,
    /// Keys dropped because an earlier row already claimed them.
    pub duplicates: Vec<DedupeKey>,
    pub header_row: Option<usize>,
}

/// Primary amount, unless it is exactly zero, in which case the fallback.
pub fn select_amount(primary: f64, fallback: Option<f64>) -> f64 {
    if primary == 0.0 {
        fallback.unwrap_or(0.0)
    } else {
        primary
    }
}

fn cell<'a>(row: &'a SourceRow, columns: &ColumnMap, field: Field) -> Option<&'a Cell> {
    columns.get(field).map(|col| row.get(col))
}

fn text(row: &SourceRow, columns: &ColumnMap, field: Field) -> Option<String> {
    cell(row, columns, field).and_then(Cell::text)
}

pub fn dedupe_key(record: &NormalisedRecord, strategy: DedupeStrategy) -> DedupeKey {
    match strategy {
        DedupeStrategy::NameReference => DedupeKey::new(record.name(), record.reference()),
        DedupeStrategy::NameClient => DedupeKey::new(record.name(), record.client()),
    }
}

/// Build one record from a classified row, or `None` when the row has no name.
pub fn build_record(
    classified: &ClassifiedRow,
    columns: &ColumnMap,
    descriptor: &SourceDescriptor,
    source_file: &str,
) -> Option<NormalisedRecord> {
    let row = classified.row;
    let name = text(row, columns, Field::Name)?;

    let primary = cell(row, columns, Field::PrimaryAmount).map(cell_amount).unwrap_or(0.0);
    let fallback = cell(row, columns, Field::FallbackAmount).map(cell_amount);
    let amount = scaled(select_amount(primary, fallback), descriptor.unit_scale);

    let forecast_category = text(row, columns, Field::ForecastCategory)
        .or_else(|| classified.context.forecast_category.clone());
    let probability = descriptor
        .probabilities
        .lookup(&classified.context.section, forecast_category.as_deref());

    Some(NormalisedRecord::new(RecordFields {
        name,
        client: text(row, columns, Field::Client),
        section: classified.context.section.clone(),
        forecast_category,
        amount,
        probability,
        reference: text(row, columns, Field::Reference),
        close_date: cell(row, columns, Field::CloseDate).and_then(cell_date),
        provenance: Provenance {
            source_file: source_file.to_string(),
            source_sheet: descriptor.sheet.clone(),
            source_row: row.index,
        },
    }))
}

/// Turn classified rows into records, dropping excluded rows, nameless rows
/// and later duplicates (first occurrence wins).
pub fn build_records(
    classified: &[ClassifiedRow],
    columns: &ColumnMap,
    descriptor: &SourceDescriptor,
    source_file: &str,
) -> Extraction {
    let mut out = Extraction {
        header_row: columns.header_row,
        ..Default::default()
    };
    let mut seen: HashSet<DedupeKey> = HashSet::new();

    for c in classified {
        if c.context.excluded {
            out.excluded += 1;
            continue;
        }
        let Some(record) = build_record(c, columns, descriptor, source_file) else {
            out.skipped += 1;
            continue;
        };
        let key = dedupe_key(&record, descriptor.dedupe);
        if !seen.insert(key.clone()) {
            log::debug!("row {}: duplicate {:?} dropped", c.row.index, key);
            out.duplicates.push(key);
            continue;
        }
        log::debug!(
            "row {}: {} [{}] {:.2} x {:.2} = {:.2}",
            c.row.index,
            record.name(),
            record.section(),
            record.amount(),
            record.probability(),
            record.weighted_amount()
        );
        out.records.push(record);
    }
    out
}

/// Full pass over a sheet's rows: resolve the column map, classify the rows
/// below the header, build and deduplicate.
pub fn extract(rows: &[SourceRow], descriptor: &SourceDescriptor, source_file: &str) -> Extraction {
    let columns = ColumnMap::resolve(rows, &descriptor.columns, descriptor.header_search_rows);
    if columns.get(Field::Name).is_none() {
        log::warn!("{}: no name column found in sheet {:?}", source_file, descriptor.sheet);
        return Extraction::default();
    }
    let data = match columns.header_row {
        Some(h) => &rows[h + 1..],
        None => rows,
    };
    let classified = classify(data, &descriptor.classifier);
    build_records(&classified, &columns, descriptor, source_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::classifier::{default_summary_labels, ClassifierRules, MatchType, SectionMarker};
    use crate::descriptor::{ColumnSpec, ProbabilityTable, SourceKind};

    /// Name, forecast category, net booking, quote number.
    fn scenario_descriptor() -> SourceDescriptor {
        let col = |field, index| ColumnSpec { field, headers: vec![], index: Some(index) };
        SourceDescriptor {
            key: "test".into(),
            description: String::new(),
            sheet: "Dial 2".into(),
            table: "burc_pipeline_detail".into(),
            header_search_rows: 5,
            columns: vec![
                col(Field::Name, 0),
                col(Field::ForecastCategory, 1),
                col(Field::PrimaryAmount, 2),
                col(Field::Reference, 3),
                col(Field::FallbackAmount, 4),
            ],
            unit_scale: 1.0,
            classifier: ClassifierRules {
                markers: vec![
                    SectionMarker::new("GREEN", MatchType::StartsWith, "green", Some("Best Case")),
                    SectionMarker::new("YELLOW", MatchType::StartsWith, "yellow", Some("Business Case")),
                    SectionMarker::exclude("Lost", MatchType::StartsWith, "lost"),
                ],
                summary_labels: default_summary_labels(),
            },
            probabilities: ProbabilityTable {
                sections: BTreeMap::from([("green".into(), 0.9), ("yellow".into(), 0.5)]),
                overrides: vec![],
                default: 0.0,
            },
            dedupe: DedupeStrategy::NameReference,
        }
    }

    fn row(index: usize, cells: Vec<Cell>) -> SourceRow {
        SourceRow::new(index, cells)
    }

    fn deal(index: usize, name: &str, category: &str, amount: f64, quote: &str) -> SourceRow {
        row(index, vec![name.into(), category.into(), amount.into(), quote.into()])
    }

    #[test]
    fn test_green_best_case_scenario() {
        let rows = vec![
            row(0, vec!["GREEN".into()]),
            deal(1, "SA Health Renewal", "Best Case", 46000.0, ""),
        ];
        let out = extract(&rows, &scenario_descriptor(), "burc.xlsx");
        assert_eq!(out.records.len(), 1);
        let rec = &out.records[0];
        assert_eq!(rec.forecast_category(), Some("Best Case"));
        assert_eq!(rec.probability(), 0.9);
        assert!((rec.weighted_amount() - 41400.0).abs() < 1e-9);
        assert_eq!(rec.reference(), None);
        assert_eq!(rec.provenance().source_row, 1);
        assert_eq!(rec.provenance().source_sheet, "Dial 2");
    }

    #[test]
    fn test_nameless_row_skipped() {
        let rows = vec![
            row(0, vec!["GREEN".into()]),
            row(1, vec!["".into(), "Best Case".into(), 1000.0.into()]),
            deal(2, "Real Deal", "Best Case", 10.0, "Q1"),
        ];
        let out = extract(&rows, &scenario_descriptor(), "burc.xlsx");
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].name(), "Real Deal");
    }

    #[test]
    fn test_nameless_row_outside_first_column_counted() {
        let mut desc = scenario_descriptor();
        desc.columns[0].index = Some(5);
        let rows = vec![deal(0, "label only", "Best Case", 10.0, "Q1")];
        let out = extract(&rows, &desc, "burc.xlsx");
        assert!(out.records.is_empty());
        assert_eq!(out.skipped, 1);
    }

    #[test]
    fn test_dedupe_first_wins() {
        let rows = vec![
            deal(0, "Epic Upgrade", "Best Case", 100.0, "Q-9"),
            deal(1, "epic upgrade ", "Best Case", 999.0, "q-9"),
            deal(2, "Epic Upgrade", "Best Case", 50.0, "Q-10"),
        ];
        let out = extract(&rows, &scenario_descriptor(), "burc.xlsx");
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].amount(), 100.0);
        assert_eq!(out.records[1].reference(), Some("Q-10"));
        assert_eq!(out.duplicates, vec![DedupeKey::new("Epic Upgrade", Some("Q-9"))]);
    }

    #[test]
    fn test_dedupe_name_client() {
        let mut desc = scenario_descriptor();
        desc.dedupe = DedupeStrategy::NameClient;
        desc.columns.push(ColumnSpec { field: Field::Client, headers: vec![], index: Some(5) });
        let mk = |i, client: &str, amount: f64| {
            row(i, vec!["Sunrise EMR".into(), "".into(), amount.into(), "".into(), "".into(), client.into()])
        };
        let rows = vec![mk(0, "SA Health", 1.0), mk(1, "WA Health", 2.0), mk(2, "SA Health", 3.0)];
        let out = extract(&rows, &desc, "burc.xlsx");
        let amounts: Vec<f64> = out.records.iter().map(|r| r.amount()).collect();
        assert_eq!(amounts, vec![1.0, 2.0]);
    }

    #[test]
    fn test_excluded_rows_dropped_and_do_not_claim_keys() {
        let rows = vec![
            row(0, vec!["Lost".into()]),
            deal(1, "Gone Deal", "Best Case", 10.0, "Q1"),
            row(2, vec!["YELLOW".into()]),
            deal(3, "Gone Deal", "", 20.0, "Q1"),
        ];
        let out = extract(&rows, &scenario_descriptor(), "burc.xlsx");
        assert_eq!(out.excluded, 1);
        assert_eq!(out.records.len(), 1);
        let rec = &out.records[0];
        assert_eq!(rec.amount(), 20.0);
        assert_eq!(rec.section(), "yellow");
        // category inherited from the section marker
        assert_eq!(rec.forecast_category(), Some("Business Case"));
        assert_eq!(rec.probability(), 0.5);
    }

    #[test]
    fn test_select_amount_fallback_only_on_exact_zero() {
        assert_eq!(select_amount(100.0, Some(500.0)), 100.0);
        assert_eq!(select_amount(0.0, Some(500.0)), 500.0);
        assert_eq!(select_amount(-0.0, Some(500.0)), 500.0);
        assert_eq!(select_amount(0.0, None), 0.0);
        assert_eq!(select_amount(-25.0, Some(500.0)), -25.0);
        assert_eq!(select_amount(0.001, Some(500.0)), 0.001);
    }

    #[test]
    fn test_fallback_amount_and_unit_scale() {
        let mut desc = scenario_descriptor();
        desc.unit_scale = 1000.0;
        let rows = vec![row(
            0,
            vec!["Deal".into(), "Best Case".into(), "-".into(), "Q1".into(), "(1,234)".into()],
        )];
        let out = extract(&rows, &desc, "burc.xlsx");
        let rec = &out.records[0];
        assert_eq!(rec.amount(), -1_234_000.0);
        assert!((rec.weighted_amount() - rec.amount() * rec.probability()).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_invariant_for_every_record() {
        let mut rows = vec![row(0, vec!["GREEN".into()])];
        for i in 1..30 {
            if i == 10 {
                rows.push(row(i, vec!["YELLOW".into()]));
                continue;
            }
            rows.push(deal(i, &format!("Deal {i}"), "", i as f64 * 1234.5, &format!("Q{i}")));
        }
        let out = extract(&rows, &scenario_descriptor(), "burc.xlsx");
        assert_eq!(out.records.len(), 28);
        for rec in &out.records {
            assert!((rec.weighted_amount() - rec.amount() * rec.probability()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_header_row_resolved_with_builtin_pipeline() {
        let desc = SourceKind::BurcPipeline.descriptor();
        let rows = vec![
            row(0, vec!["APAC Dial 2".into()]),
            row(1, vec!["Opportunity".into(), "Account".into(), "Forecast Category".into(), "Net Booking".into(), "TCV".into(), "Quote #".into(), "Close Date".into()]),
            row(2, vec!["Green: Committed".into()]),
            row(3, vec!["SA Health Renewal".into(), "SA Health".into(), "Best Case".into(), 46000.0.into(), 50000.0.into(), 1001.0.into(), 45747.0.into()]),
            row(4, vec!["WA Sunrise".into(), "WA Health".into(), "Business Case".into(), 0.0.into(), 20000.0.into(), "Q-7".into()]),
            row(5, vec!["Total Green".into(), "".into(), "".into(), 46000.0.into()]),
            row(6, vec!["Closed".into()]),
            row(7, vec!["Old Deal".into(), "".into(), "Best Case".into(), 5.0.into()]),
        ];
        let out = extract(&rows, &desc, "2025 BURC.xlsx");
        assert_eq!(out.header_row, Some(1));
        assert_eq!(out.excluded, 1);
        assert_eq!(out.records.len(), 2);

        let first = &out.records[0];
        assert_eq!(first.client(), Some("SA Health"));
        assert_eq!(first.reference(), Some("1001"));
        assert_eq!(first.close_date(), chrono::NaiveDate::from_ymd_opt(2025, 3, 31));
        assert!((first.weighted_amount() - 41400.0).abs() < 1e-9);

        let second = &out.records[1];
        assert_eq!(second.amount(), 20000.0);
        // green section, business case override
        assert_eq!(second.probability(), 0.5);
    }

    #[test]
    fn test_missing_name_column_yields_nothing() {
        let mut desc = scenario_descriptor();
        desc.columns[0].index = None;
        let rows = vec![deal(0, "Deal", "Best Case", 1.0, "Q")];
        let out = extract(&rows, &desc, "burc.xlsx");
        assert!(out.records.is_empty());
    }
}
