//! CSI operating ratios from the monthly BURC financials.
//!
//! Three workbook layouts are understood: the "APAC Performance" xlsx with one
//! sheet per block and months across columns B..M, and the monthly BURC xlsb
//! whose single "APAC" sheet changed row positions after FY2023.

use std::path::Path;

use serde::Serialize;

use crate::error::{Result, SyncError};
use crate::models::SourceRow;
use crate::normaliser::cell_amount;
use crate::store::Row;

pub const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub const NR_SHEET: &str = "APAC BURC - Monthly NR Comp";
pub const OPEX_SHEET: &str = "APAC BURC - Monthly OPEX Comp";
pub const EBITA_SHEET: &str = "APAC BURC - Monthly EBITA";
pub const APAC_SHEET: &str = "APAC";

pub const OPEX_TABLE: &str = "burc_csi_opex";
pub const RATIOS_TABLE: &str = "burc_csi_ratios";

/// 0-indexed row positions of each line item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowMap {
    /// licence, PS, maintenance, total net revenue
    pub revenue: [usize; 4],
    /// PS, maintenance, S&M, R&D, G&A, total OPEX
    pub opex: [usize; 6],
    /// EBITA, EBITA %
    pub ebita: [usize; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// "APAC Performance" xlsx, one sheet per block.
    Performance,
    /// Monthly BURC xlsb up to FY2023, twelve month columns.
    ApacLegacy,
    /// Monthly BURC xlsb from FY2024, one current-period column.
    ApacCurrent,
}

impl Layout {
    pub fn detect(path: &Path, year: i32) -> Layout {
        let is_xlsb = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("xlsb"));
        match (is_xlsb, year <= 2023) {
            (false, _) => Layout::Performance,
            (true, true) => Layout::ApacLegacy,
            (true, false) => Layout::ApacCurrent,
        }
    }

    pub fn rows(&self) -> RowMap {
        match self {
            // sheet rows 4,9,14,24 / 4,9,14,19,24,30 / 4,9
            Layout::Performance => RowMap {
                revenue: [3, 8, 13, 23],
                opex: [3, 8, 13, 18, 23, 29],
                ebita: [3, 8],
            },
            Layout::ApacLegacy => RowMap {
                revenue: [49, 50, 55, 65],
                opex: [93, 120, 147, 174, 201, 204],
                ebita: [206, 207],
            },
            Layout::ApacCurrent => RowMap {
                revenue: [50, 54, 60, 67],
                opex: [97, 126, 155, 184, 213, 244],
                ebita: [246, 247],
            },
        }
    }

    /// Revenue, OPEX and EBITA sheet names.
    pub fn sheets(&self) -> [&'static str; 3] {
        match self {
            Layout::Performance => [NR_SHEET, OPEX_SHEET, EBITA_SHEET],
            Layout::ApacLegacy | Layout::ApacCurrent => [APAC_SHEET; 3],
        }
    }

    /// 0-indexed column holding `month` (1..=12).
    pub fn column(&self, month: u32) -> usize {
        match self {
            Layout::Performance => month as usize,
            Layout::ApacLegacy => 13 + month as usize,
            Layout::ApacCurrent => 10,
        }
    }

    /// Months to extract. The current xlsb layout only carries one period,
    /// so it needs to be told which.
    pub fn months(&self, month: Option<u32>) -> Result<Vec<u32>> {
        if let Some(m) = month {
            if !(1..=12).contains(&m) {
                return Err(SyncError::Other(format!("month must be 1-12, got {m}")));
            }
            return Ok(vec![m]);
        }
        match self {
            Layout::ApacCurrent => Err(SyncError::Other(
                "Month required for xlsb files after 2023 (--month N)".to_string(),
            )),
            _ => Ok((1..=12).collect()),
        }
    }
}

/// The three row blocks of a workbook. For the xlsb layouts all three point at
/// the same sheet.
#[derive(Debug, Clone, Copy)]
pub struct Grid<'a> {
    pub revenue: &'a [SourceRow],
    pub opex: &'a [SourceRow],
    pub ebita: &'a [SourceRow],
}

fn value_at(rows: &[SourceRow], row: usize, col: usize) -> f64 {
    rows.iter()
        .find(|r| r.index == row)
        .map(|r| cell_amount(r.get(col)))
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyFinancials {
    pub year: i32,
    pub month_num: u32,
    pub month: String,
    pub license_nr: f64,
    pub ps_nr: f64,
    pub maintenance_nr: f64,
    pub total_nr: f64,
    pub ps_opex: f64,
    pub maintenance_opex: f64,
    pub sm_opex: f64,
    pub rd_opex: f64,
    pub ga_opex: f64,
    pub total_opex: f64,
    pub ebita: f64,
    pub ebita_percent: f64,
    pub source_file: String,
}

impl MonthlyFinancials {
    pub fn has_data(&self) -> bool {
        self.total_nr != 0.0 || self.total_opex != 0.0
    }

    pub fn to_row(&self) -> Row {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Row::new(),
        }
    }
}

/// Read the requested months; months with neither revenue nor OPEX are dropped.
pub fn extract_months(
    grid: Grid,
    layout: Layout,
    year: i32,
    months: &[u32],
    source_file: &str,
) -> Vec<MonthlyFinancials> {
    let map = layout.rows();
    months
        .iter()
        .filter_map(|&m| {
            let col = layout.column(m);
            let nr = |i: usize| value_at(grid.revenue, map.revenue[i], col);
            let opex = |i: usize| value_at(grid.opex, map.opex[i], col);
            let ebita = |i: usize| value_at(grid.ebita, map.ebita[i], col);
            let data = MonthlyFinancials {
                year,
                month_num: m,
                month: MONTHS[(m as usize - 1) % 12].to_string(),
                license_nr: nr(0),
                ps_nr: nr(1),
                maintenance_nr: nr(2),
                total_nr: nr(3),
                ps_opex: opex(0),
                maintenance_opex: opex(1),
                sm_opex: opex(2),
                rd_opex: opex(3),
                ga_opex: opex(4),
                total_opex: opex(5),
                ebita: ebita(0),
                ebita_percent: ebita(1),
                source_file: source_file.to_string(),
            };
            if data.has_data() {
                Some(data)
            } else {
                log::debug!("{year}-{m:02}: no revenue or OPEX, skipped");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Green,
    Amber,
    Red,
}

impl Status {
    /// Higher is better; amber within 80% of target.
    pub fn at_least(value: f64, target: f64) -> Status {
        if value >= target {
            Status::Green
        } else if value >= target * 0.8 {
            Status::Amber
        } else {
            Status::Red
        }
    }

    /// Lower is better; amber within 120% of target.
    pub fn at_most(value: f64, target: f64) -> Status {
        if value <= target {
            Status::Green
        } else if value <= target * 1.2 {
            Status::Amber
        } else {
            Status::Red
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Green => write!(f, "green"),
            Status::Amber => write!(f, "amber"),
            Status::Red => write!(f, "red"),
        }
    }
}

pub const PS_TARGET: f64 = 2.0;
pub const SALES_TARGET: f64 = 1.0;
pub const MAINTENANCE_TARGET: f64 = 4.0;
pub const RD_TARGET: f64 = 1.0;
/// Percent of total net revenue.
pub const GA_TARGET: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsiRatios {
    pub year: i32,
    pub month_num: u32,
    pub ps_ratio: f64,
    pub sales_ratio: f64,
    pub maintenance_ratio: f64,
    pub rd_ratio: f64,
    pub ga_ratio: f64,
    pub ps_status: Status,
    pub sales_status: Status,
    pub maintenance_status: Status,
    pub rd_status: Status,
    pub ga_status: Status,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

impl CsiRatios {
    /// Statuses are judged on the unrounded ratios.
    pub fn calculate(d: &MonthlyFinancials) -> Self {
        let ps = ratio(d.ps_nr, d.ps_opex);
        let sales = ratio(0.70 * d.license_nr, d.sm_opex.abs());
        let maintenance = ratio(0.85 * d.maintenance_nr, d.maintenance_opex);
        let rd = ratio(0.30 * d.license_nr + 0.15 * d.maintenance_nr, d.rd_opex);
        let ga = ratio(d.ga_opex, d.total_nr) * 100.0;

        Self {
            year: d.year,
            month_num: d.month_num,
            ps_ratio: round4(ps),
            sales_ratio: round4(sales),
            maintenance_ratio: round4(maintenance),
            rd_ratio: round4(rd),
            ga_ratio: round4(ga),
            ps_status: Status::at_least(ps, PS_TARGET),
            sales_status: Status::at_least(sales, SALES_TARGET),
            maintenance_status: Status::at_least(maintenance, MAINTENANCE_TARGET),
            rd_status: Status::at_least(rd, RD_TARGET),
            ga_status: Status::at_most(ga, GA_TARGET),
        }
    }

    pub fn to_row(&self) -> Row {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Row::new(),
        }
    }
}
