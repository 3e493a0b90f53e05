use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single spreadsheet cell, detached from the workbook reader.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    /// Trimmed text of the cell, or `None` when the cell holds nothing
    /// printable. Numbers render without a trailing `.0` for whole values.
    pub fn text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    None
                } else {
                    Some(s.to_string())
                }
            }
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

/// A raw sheet row. `index` is the absolute 0-based row number in the sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub index: usize,
    pub cells: Vec<Cell>,
}

impl SourceRow {
    pub fn new(index: usize, cells: Vec<Cell>) -> Self {
        Self { index, cells }
    }

    pub fn get(&self, col: usize) -> &Cell {
        self.cells.get(col).unwrap_or(&Cell::Empty)
    }

    pub fn first_text(&self) -> Option<String> {
        self.get(0).text()
    }
}

/// Section state carried across rows by the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionContext {
    pub section: String,
    pub forecast_category: Option<String>,
    pub excluded: bool,
}

impl SectionContext {
    pub fn new(section: &str, forecast_category: Option<&str>) -> Self {
        Self {
            section: section.to_string(),
            forecast_category: forecast_category.map(str::to_string),
            excluded: false,
        }
    }

    pub fn excluded(label: &str) -> Self {
        Self {
            section: label.to_string(),
            forecast_category: None,
            excluded: true,
        }
    }
}

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub source_file: String,
    pub source_sheet: String,
    pub source_row: usize,
}

/// A flat, typed record built from one classified row.
///
/// The weighted amount is derived from `amount * probability` on construction
/// and on every probability change, so the two can never drift apart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalisedRecord {
    name: String,
    client: Option<String>,
    section: String,
    forecast_category: Option<String>,
    amount: f64,
    probability: f64,
    weighted_amount: f64,
    reference: Option<String>,
    close_date: Option<NaiveDate>,
    #[serde(flatten)]
    provenance: Provenance,
}

pub struct RecordFields {
    pub name: String,
    pub client: Option<String>,
    pub section: String,
    pub forecast_category: Option<String>,
    pub amount: f64,
    pub probability: f64,
    pub reference: Option<String>,
    pub close_date: Option<NaiveDate>,
    pub provenance: Provenance,
}

impl NormalisedRecord {
    pub fn new(fields: RecordFields) -> Self {
        let probability = clamp_probability(fields.probability);
        Self {
            name: fields.name,
            client: fields.client,
            section: fields.section,
            forecast_category: fields.forecast_category,
            amount: fields.amount,
            probability,
            weighted_amount: fields.amount * probability,
            reference: fields.reference,
            close_date: fields.close_date,
            provenance: fields.provenance,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn forecast_category(&self) -> Option<&str> {
        self.forecast_category.as_deref()
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn weighted_amount(&self) -> f64 {
        self.weighted_amount
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn close_date(&self) -> Option<NaiveDate> {
        self.close_date
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Flat JSON row for the store.
    pub fn to_row(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

fn clamp_probability(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Identity of a record within one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey {
    pub name: String,
    pub qualifier: String,
}

impl DedupeKey {
    pub fn new(name: &str, qualifier: Option<&str>) -> Self {
        Self {
            name: fold(name),
            qualifier: qualifier.map(fold).unwrap_or_default(),
        }
    }
}

fn fold(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Shape of a pipeline/attrition record as read back from the store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredRecord {
    pub name: String,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub probability: f64,
    #[serde(default)]
    pub weighted_amount: f64,
}
