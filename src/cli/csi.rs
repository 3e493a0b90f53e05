use std::path::PathBuf;

use colored::{ColoredString, Colorize};
use comfy_table::{Cell, Table};

use super::sync::print_write_result;
use super::{context, current_year, options, resolve_workbook, GlobalArgs};
use crate::csi::Status;
use crate::error::Result;
use crate::fmt::{compact_money, percent, ratio};
use crate::pipeline::sync_csi;

fn badge(value: String, status: Status) -> ColoredString {
    match status {
        Status::Green => value.green(),
        Status::Amber => value.yellow(),
        Status::Red => value.red(),
    }
}

pub fn run(global: &GlobalArgs, file: Option<PathBuf>, year: Option<i32>, month: Option<u32>) -> Result<()> {
    let ctx = context(global)?;
    let year = year.unwrap_or_else(current_year);
    let path = resolve_workbook(&ctx.settings, file, year)?;

    println!("{} FY{year}", "CSI Ratios".bold());
    println!("  File: {}", path.display());

    let outcome = sync_csi(ctx.store(), &path, year, month, options(global, &ctx.settings))?;
    println!("  Layout: {:?}, {} month(s) with data", outcome.layout, outcome.months.len());

    let mut table = Table::new();
    table.set_header(vec!["Month", "PS", "Sales", "Maint", "R&D", "G&A", "EBITA", "EBITA%"]);
    for (m, r) in outcome.months.iter().zip(&outcome.ratios) {
        table.add_row(vec![
            Cell::new(&m.month),
            Cell::new(badge(ratio(r.ps_ratio), r.ps_status)),
            Cell::new(badge(ratio(r.sales_ratio), r.sales_status)),
            Cell::new(badge(ratio(r.maintenance_ratio), r.maintenance_status)),
            Cell::new(badge(ratio(r.rd_ratio), r.rd_status)),
            Cell::new(badge(format!("{:.1}%", r.ga_ratio), r.ga_status)),
            Cell::new(compact_money(m.ebita)),
            Cell::new(percent(m.ebita_percent)),
        ]);
    }
    table.add_row(vec![
        Cell::new("Target".bold()),
        Cell::new(">=2.0"),
        Cell::new(">=1.0"),
        Cell::new(">=4.0"),
        Cell::new(">=1.0"),
        Cell::new("<=20%"),
        Cell::new(""),
        Cell::new(""),
    ]);
    println!("\n{table}");

    print_write_result(outcome.opex_report.as_ref(), global.dry_run, outcome.sheets_found);
    print_write_result(outcome.ratios_report.as_ref(), global.dry_run, outcome.sheets_found);
    Ok(())
}
