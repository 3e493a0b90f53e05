use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, Table};

use super::{context, current_year, resolve_descriptor, GlobalArgs};
use crate::error::Result;
use crate::validate::{validate_source, Severity};

/// Returns the process exit code: 0 pass, 1 fail, 2 pass with warnings.
pub fn run(
    global: &GlobalArgs,
    source: &str,
    descriptor: Option<PathBuf>,
    fiscal_year: Option<i32>,
) -> Result<i32> {
    let descriptor = resolve_descriptor(source, descriptor.as_deref())?;
    let ctx = context(global)?;
    let year = fiscal_year.unwrap_or_else(current_year);
    let report = validate_source(ctx.store(), &descriptor, year)?;

    if !report.findings.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Severity", "Record", "Finding"]);
        for f in &report.findings {
            let severity = match f.severity {
                Severity::Error => f.severity.to_string().red().bold(),
                Severity::Warning => f.severity.to_string().yellow(),
            };
            table.add_row(vec![Cell::new(severity), Cell::new(&f.record), Cell::new(&f.message)]);
        }
        println!("{table}");
    }

    let summary = format!(
        "{} (FY{year}): {} records, {} errors, {} warnings",
        descriptor.table,
        report.checked,
        report.errors(),
        report.warnings()
    );
    let code = report.exit_code();
    match code {
        0 => println!("{} {summary}", "PASS".green().bold()),
        1 => println!("{} {summary}", "FAIL".red().bold()),
        _ => println!("{} {summary}", "PASS (warnings)".yellow().bold()),
    }
    Ok(code)
}
