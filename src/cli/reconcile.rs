use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, Table};

use super::sync::print_write_result;
use super::{context, current_year, options, resolve_descriptor, resolve_workbook, GlobalArgs};
use crate::error::Result;
use crate::fmt::money;
use crate::matcher::Confidence;
use crate::pipeline::reconcile_source;

pub fn run(
    global: &GlobalArgs,
    source: &str,
    descriptor: Option<PathBuf>,
    file: Option<PathBuf>,
    fiscal_year: Option<i32>,
) -> Result<()> {
    let descriptor = resolve_descriptor(source, descriptor.as_deref())?;
    let ctx = context(global)?;
    let year = fiscal_year.unwrap_or_else(current_year);
    let path = resolve_workbook(&ctx.settings, file, year)?;

    let outcome = reconcile_source(
        ctx.store(),
        &descriptor,
        &path,
        year,
        &ctx.settings.reconcile,
        &ctx.settings.matcher,
        options(global, &ctx.settings),
    )?;
    let rec = &outcome.reconciliation;

    let mut table = Table::new();
    table.set_header(vec!["Record", "Amount", "Matched", "Confidence", "Score"]);
    for r in &rec.results {
        let confidence = match r.confidence {
            Some(Confidence::Exact) => "exact".green(),
            Some(Confidence::Fuzzy) => "fuzzy".yellow(),
            None => "unmatched".red(),
        };
        table.add_row(vec![
            Cell::new(&r.name),
            Cell::new(money(r.amount)),
            Cell::new(r.matched_name.as_deref().unwrap_or("")),
            Cell::new(confidence),
            Cell::new(r.score.map(|s| format!("{s:.2}")).unwrap_or_default()),
        ]);
    }
    println!("Reconcile {} (FY{year}) against {}\n{table}", descriptor.key, ctx.settings.reconcile.table);
    println!(
        "  {} records: {} exact, {} fuzzy, {} unmatched ({} candidates)",
        outcome.extraction.records.len(),
        rec.exact(),
        rec.fuzzy(),
        rec.unmatched(),
        rec.secondary_count
    );
    print_write_result(outcome.report.as_ref(), global.dry_run, outcome.sheet_found);
    Ok(())
}
