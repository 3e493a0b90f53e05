use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, Table};

use super::{context, current_year, options, resolve_descriptor, resolve_workbook, GlobalArgs};
use crate::error::Result;
use crate::fmt::money;
use crate::pipeline::{sync_source, SyncOutcome};
use crate::report::{grand_total, section_totals};
use crate::sink::ReplaceReport;

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

    println!(
        "{} {} -> {} (FY{year})",
        "Sync".bold(),
        descriptor.key,
        descriptor.table
    );
    println!("  File:  {}", path.display());
    println!("  Sheet: {}", descriptor.sheet);

    let outcome = sync_source(ctx.store(), &descriptor, &path, year, options(global, &ctx.settings))?;
    if global.verbose {
        print_records(&outcome);
    }
    print_summary(&outcome);
    print_write_result(outcome.report.as_ref(), global.dry_run, outcome.sheet_found);
    Ok(())
}

fn print_records(outcome: &SyncOutcome) {
    let mut table = Table::new();
    table.set_header(vec!["Row", "Name", "Section", "Category", "Close", "Amount", "Weighted"]);
    for r in &outcome.extraction.records {
        table.add_row(vec![
            Cell::new(r.provenance().source_row + 1),
            Cell::new(r.name()),
            Cell::new(r.section()),
            Cell::new(r.forecast_category().unwrap_or("")),
            Cell::new(r.close_date().map(|d| d.to_string()).unwrap_or_default()),
            Cell::new(money(r.amount())),
            Cell::new(money(r.weighted_amount())),
        ]);
    }
    println!("\n{table}");
}

fn print_summary(outcome: &SyncOutcome) {
    let extraction = &outcome.extraction;
    let totals = section_totals(&extraction.records);

    let mut table = Table::new();
    table.set_header(vec!["Section", "Records", "Amount", "Weighted"]);
    for t in &totals {
        table.add_row(vec![
            Cell::new(&t.section),
            Cell::new(t.records),
            Cell::new(money(t.amount)),
            Cell::new(money(t.weighted_amount)),
        ]);
    }
    let total = grand_total(&totals);
    table.add_row(vec![
        Cell::new("Total".bold()),
        Cell::new(total.records),
        Cell::new(money(total.amount)),
        Cell::new(money(total.weighted_amount).bold()),
    ]);
    println!("\n{table}");

    match extraction.header_row {
        Some(h) => println!("  Header found at row {}; scope {}", h + 1, outcome.scope),
        None => println!("  No header row found, using fixed columns; scope {}", outcome.scope),
    }
    println!(
        "  {} skipped (no name), {} excluded, {} duplicates dropped",
        extraction.skipped,
        extraction.excluded,
        extraction.duplicates.len()
    );
}

pub(crate) fn print_write_result(report: Option<&ReplaceReport>, dry_run: bool, sheet_found: bool) {
    match report {
        Some(r) if r.is_complete() => println!(
            "{}",
            format!("Replaced: deleted {}, inserted {}", r.deleted, r.inserted).green()
        ),
        Some(r) => {
            println!(
                "{}",
                format!(
                    "Partial write: deleted {}, inserted {}, {} batch(es) failed",
                    r.deleted,
                    r.inserted,
                    r.failed_batches.len()
                )
                .red()
                .bold()
            );
            for f in &r.failed_batches {
                println!("  batch {} ({} rows): {}", f.index + 1, f.rows, f.message);
            }
        }
        None if dry_run => println!("{}", "Dry run: no changes written.".yellow()),
        None if !sheet_found => println!("{}", "Sheet not found; stored rows left unchanged.".yellow()),
        None => {}
    }
}
