use std::path::Path;

use crate::builder::{extract, Extraction};
use crate::csi::{self, CsiRatios, Grid, Layout, MonthlyFinancials};
use crate::descriptor::SourceDescriptor;
use crate::error::Result;
use crate::matcher::MatcherConfig;
use crate::reconcile::{load_secondary, reconcile, Reconciliation, SecondarySource};
use crate::sheet::Workbook;
use crate::sink::{record_audit, replace_scope, AuditEntry, ReplaceReport, Scope};
use crate::store::TableStore;

pub const MATCHES_TABLE: &str = "burc_pipeline_matches";

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub dry_run: bool,
    pub batch_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: 100,
        }
    }
}

/// Read and extract one source sheet. `None` when the sheet is missing.
pub fn load_records(path: &Path, descriptor: &SourceDescriptor) -> Result<Option<Extraction>> {
    let mut workbook = Workbook::open(path)?;
    let file_name = workbook.file_name();
    let Some(rows) = workbook.read_sheet(&descriptor.sheet) else {
        return Ok(None);
    };
    log::debug!("{file_name}: {} rows in {:?}", rows.len(), descriptor.sheet);
    Ok(Some(extract(&rows, descriptor, &file_name)))
}

/// Rows a sync of this descriptor owns for one fiscal year.
pub fn record_scope(descriptor: &SourceDescriptor, fiscal_year: i32) -> Scope {
    Scope::new()
        .with("fiscal_year", fiscal_year)
        .with("source_sheet", descriptor.sheet.as_str())
}

/// Full-replace `rows` into `table` for `scope`, unless this is a dry run.
/// An empty `rows` still clears the scope. `None` means no write was attempted.
fn write_scope(
    store: &dyn TableStore,
    source: &str,
    table: &str,
    scope: &Scope,
    rows: Vec<crate::store::Row>,
    opts: SyncOptions,
) -> Result<Option<ReplaceReport>> {
    if opts.dry_run {
        log::info!("dry run: would replace {} rows in {table} for {scope}", rows.len());
        return Ok(None);
    }
    let records = rows.len();
    let report = replace_scope(store, table, scope, rows, opts.batch_size)?;
    record_audit(store, &AuditEntry::new(source, scope, records, &report, false));
    Ok(Some(report))
}

#[derive(Debug)]
pub struct SyncOutcome {
    pub extraction: Extraction,
    pub scope: Scope,
    /// False when the source sheet is missing; nothing is written then.
    pub sheet_found: bool,
    pub report: Option<ReplaceReport>,
}

pub fn sync_source(
    store: &dyn TableStore,
    descriptor: &SourceDescriptor,
    path: &Path,
    fiscal_year: i32,
    opts: SyncOptions,
) -> Result<SyncOutcome> {
    let scope = record_scope(descriptor, fiscal_year);
    let Some(extraction) = load_records(path, descriptor)? else {
        log::warn!("{}: sheet {:?} missing; stored rows for {scope} left unchanged", descriptor.key, descriptor.sheet);
        return Ok(SyncOutcome {
            extraction: Extraction::default(),
            scope,
            sheet_found: false,
            report: None,
        });
    };
    log::info!(
        "{}: {} records ({} skipped, {} excluded, {} duplicates)",
        descriptor.key,
        extraction.records.len(),
        extraction.skipped,
        extraction.excluded,
        extraction.duplicates.len()
    );
    let rows = extraction.records.iter().map(|r| r.to_row()).collect();
    let report = write_scope(store, &descriptor.key, &descriptor.table, &scope, rows, opts)?;
    Ok(SyncOutcome {
        extraction,
        scope,
        sheet_found: true,
        report,
    })
}

#[derive(Debug)]
pub struct ReconcileOutcome {
    pub extraction: Extraction,
    pub reconciliation: Reconciliation,
    pub sheet_found: bool,
    pub report: Option<ReplaceReport>,
}

pub fn reconcile_source(
    store: &dyn TableStore,
    descriptor: &SourceDescriptor,
    path: &Path,
    fiscal_year: i32,
    secondary: &SecondarySource,
    matcher: &MatcherConfig,
    opts: SyncOptions,
) -> Result<ReconcileOutcome> {
    let loaded = load_records(path, descriptor)?;
    let sheet_found = loaded.is_some();
    let extraction = loaded.unwrap_or_default();
    let secondaries = load_secondary(store, secondary, fiscal_year);
    log::info!(
        "matching {} records against {} rows of {}",
        extraction.records.len(),
        secondaries.len(),
        secondary.table
    );
    let reconciliation = reconcile(&extraction.records, &secondaries, matcher);
    let scope = Scope::new().with("fiscal_year", fiscal_year);
    let report = if sheet_found {
        write_scope(store, "reconcile", MATCHES_TABLE, &scope, reconciliation.to_rows(), opts)?
    } else {
        log::warn!("{}: sheet {:?} missing; stored matches for {scope} left unchanged", descriptor.key, descriptor.sheet);
        None
    };
    Ok(ReconcileOutcome {
        extraction,
        reconciliation,
        sheet_found,
        report,
    })
}

#[derive(Debug)]
pub struct CsiOutcome {
    pub layout: Layout,
    pub months: Vec<MonthlyFinancials>,
    pub ratios: Vec<CsiRatios>,
    pub sheets_found: bool,
    pub opex_report: Option<ReplaceReport>,
    pub ratios_report: Option<ReplaceReport>,
}

/// Monthly financials for `year`. The month list is `None` when a sheet
/// the layout needs is missing.
pub fn load_financials(
    path: &Path,
    year: i32,
    month: Option<u32>,
) -> Result<(Layout, Option<Vec<MonthlyFinancials>>)> {
    let layout = Layout::detect(path, year);
    let months = layout.months(month)?;
    let mut workbook = Workbook::open(path)?;
    let file_name = workbook.file_name();

    let [revenue_sheet, opex_sheet, ebita_sheet] = layout.sheets();
    let Some(revenue) = workbook.read_sheet(revenue_sheet) else {
        return Ok((layout, None));
    };
    let (opex, ebita) = if layout == Layout::Performance {
        match (workbook.read_sheet(opex_sheet), workbook.read_sheet(ebita_sheet)) {
            (Some(opex), Some(ebita)) => (opex, ebita),
            _ => return Ok((layout, None)),
        }
    } else {
        (Vec::new(), Vec::new())
    };
    let grid = if layout == Layout::Performance {
        Grid { revenue: &revenue, opex: &opex, ebita: &ebita }
    } else {
        Grid { revenue: &revenue, opex: &revenue, ebita: &revenue }
    };
    log::debug!("{file_name}: {layout:?} layout, months {months:?}");
    Ok((layout, Some(csi::extract_months(grid, layout, year, &months, &file_name))))
}

pub fn sync_csi(
    store: &dyn TableStore,
    path: &Path,
    year: i32,
    month: Option<u32>,
    opts: SyncOptions,
) -> Result<CsiOutcome> {
    let (layout, loaded) = load_financials(path, year, month)?;
    let sheets_found = loaded.is_some();
    let months = loaded.unwrap_or_default();
    let ratios: Vec<CsiRatios> = months.iter().map(CsiRatios::calculate).collect();

    let mut scope = Scope::new().with("year", year);
    if let Some(m) = month {
        scope = scope.with("month_num", m);
    }
    let (opex_report, ratios_report) = if sheets_found {
        let opex_rows = months.iter().map(|m| m.to_row()).collect();
        let ratio_rows = ratios.iter().map(|r| r.to_row()).collect();
        (
            write_scope(store, "csi", csi::OPEX_TABLE, &scope, opex_rows, opts)?,
            write_scope(store, "csi", csi::RATIOS_TABLE, &scope, ratio_rows, opts)?,
        )
    } else {
        log::warn!("{}: CSI sheets missing; stored rows for {scope} left unchanged", path.display());
        (None, None)
    };

    Ok(CsiOutcome {
        layout,
        months,
        ratios,
        sheets_found,
        opex_report,
        ratios_report,
    })
}
