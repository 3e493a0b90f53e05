use chrono::{Days, NaiveDate};

use crate::models::Cell;

/// Serial day that spreadsheets assign to 1970-01-01.
pub const EXCEL_UNIX_EPOCH_SERIAL: i64 = 25569;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '"', ','];

/// Leading currency codes, longest first. `A`, `NZ`, `US` and `S` are what
/// remains of `A$`, `NZ$`, `US$` and `S$` once the symbol is dropped.
const CURRENCY_CODES: &[&str] = &["AUD", "NZD", "USD", "SGD", "EUR", "GBP", "NZ", "US", "A", "S"];

fn strip_currency_code(s: &str) -> &str {
    CURRENCY_CODES
        .iter()
        .find_map(|code| {
            s.get(..code.len())
                .filter(|head| head.eq_ignore_ascii_case(code))
                .map(|_| &s[code.len()..])
        })
        .unwrap_or(s)
}

/// Parse a currency-ish string into a number. Never fails: anything that
/// does not parse is 0.
pub fn parse_amount(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && !c.is_whitespace())
        .collect();
    let mut s = cleaned.as_str();

    let parenthesised = match s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        Some(inner) => {
            s = inner;
            true
        }
        None => false,
    };

    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    }
    s = strip_currency_code(s);
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    }
    if !s.chars().any(|c| c.is_ascii_digit()) || !s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return 0.0;
    }

    let value = match s.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => return 0.0,
    };
    if parenthesised || negative {
        -value.abs()
    } else {
        value
    }
}

/// Numeric value of a cell; text goes through [`parse_amount`].
pub fn cell_amount(cell: &Cell) -> f64 {
    match cell {
        Cell::Number(n) if n.is_finite() => *n,
        Cell::Text(s) => parse_amount(s),
        _ => 0.0,
    }
}

/// Apply a sheet's unit multiplier (e.g. 1000.0 for "values in thousands").
pub fn scaled(amount: f64, unit_scale: f64) -> f64 {
    amount * unit_scale
}

/// Convert a spreadsheet serial day to a calendar date:
/// `1970-01-01 + (serial - 25569)` days. The time-of-day fraction is dropped.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    let offset = serial.floor() as i64 - EXCEL_UNIX_EPOCH_SERIAL;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    if offset >= 0 {
        epoch.checked_add_days(Days::new(offset as u64))
    } else {
        epoch.checked_sub_days(Days::new(offset.unsigned_abs()))
    }
}

/// Date value of a cell: serial numbers, ISO dates or day-first `D/M/YYYY`.
pub fn cell_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Number(n) => serial_to_date(*n),
        Cell::Text(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(serial_to_date))
        }
        _ => None,
    }
}
