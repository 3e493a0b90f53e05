use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier::{default_summary_labels, ClassifierRules, MatchType, SectionMarker};
use crate::error::{Result, SyncError};
use crate::models::SourceRow;

// ---------------------------------------------------------------------------
// Column map
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Client,
    ForecastCategory,
    PrimaryAmount,
    FallbackAmount,
    Reference,
    CloseDate,
}

/// Where to find one field: any of `headers` in the header row, or the
/// fixed `index` when the header is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub field: Field,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub index: Option<usize>,
}

impl ColumnSpec {
    fn new(field: Field, headers: &[&str], index: Option<usize>) -> Self {
        Self {
            field,
            headers: headers.iter().map(|h| h.to_string()).collect(),
            index,
        }
    }

    fn header_position(&self, row: &SourceRow) -> Option<usize> {
        row.cells.iter().position(|cell| {
            cell.text()
                .is_some_and(|t| self.headers.iter().any(|h| h.trim().eq_ignore_ascii_case(&t)))
        })
    }
}

/// Column positions resolved once per sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    columns: BTreeMap<Field, usize>,
    /// Position of the header row within the row slice it was resolved from.
    pub header_row: Option<usize>,
}

impl ColumnMap {
    pub fn get(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    /// Scan the first `search_rows` rows for a header row: the first row that
    /// names the `Name` column and at least one other column. Fields missing
    /// from the header fall back to their fixed index.
    pub fn resolve(rows: &[SourceRow], specs: &[ColumnSpec], search_rows: usize) -> Self {
        let required = specs.len().min(2);
        let header = rows.iter().take(search_rows).enumerate().find(|(_, row)| {
            let found: Vec<Field> = specs
                .iter()
                .filter(|s| s.header_position(row).is_some())
                .map(|s| s.field)
                .collect();
            found.contains(&Field::Name) && found.len() >= required
        });

        let mut columns = BTreeMap::new();
        for spec in specs {
            let pos = header
                .and_then(|(_, row)| spec.header_position(row))
                .or(spec.index);
            if let Some(pos) = pos {
                columns.insert(spec.field, pos);
            }
        }
        Self {
            columns,
            header_row: header.map(|(i, _)| i),
        }
    }
}

// ---------------------------------------------------------------------------
// Probability table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityOverride {
    /// Restrict to one section; `None` applies in every section.
    #[serde(default)]
    pub section: Option<String>,
    pub forecast_category: String,
    pub probability: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityTable {
    pub sections: BTreeMap<String, f64>,
    #[serde(default)]
    pub overrides: Vec<ProbabilityOverride>,
    #[serde(default)]
    pub default: f64,
}

impl ProbabilityTable {
    /// Probability for a `(section, forecast category)` pair. A
    /// section-specific override beats a global one, which beats the
    /// section's base weight.
    pub fn lookup(&self, section: &str, category: Option<&str>) -> f64 {
        if let Some(category) = category {
            let category = category.trim();
            let hit = self
                .overrides
                .iter()
                .filter(|o| o.forecast_category.eq_ignore_ascii_case(category))
                .find(|o| o.section.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(section)))
                .or_else(|| {
                    self.overrides
                        .iter()
                        .find(|o| o.section.is_none() && o.forecast_category.eq_ignore_ascii_case(category))
                });
            if let Some(o) = hit {
                return o.probability;
            }
        }
        self.sections
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(section))
            .map(|(_, p)| *p)
            .unwrap_or(self.default)
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupeStrategy {
    /// Deal name + external quote/reference number.
    #[default]
    NameReference,
    /// Name + client, for attrition/risk rows.
    NameClient,
}

fn default_header_search_rows() -> usize {
    20
}

fn default_unit_scale() -> f64 {
    1.0
}

/// Everything that differs between one source sheet and another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub key: String,
    #[serde(default)]
    pub description: String,
    pub sheet: String,
    pub table: String,
    #[serde(default = "default_header_search_rows")]
    pub header_search_rows: usize,
    pub columns: Vec<ColumnSpec>,
    /// Multiplier applied to every amount (1000.0 for "values in thousands").
    #[serde(default = "default_unit_scale")]
    pub unit_scale: f64,
    #[serde(default)]
    pub classifier: ClassifierRules,
    pub probabilities: ProbabilityTable,
    #[serde(default)]
    pub dedupe: DedupeStrategy,
}

impl SourceDescriptor {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let descriptor: SourceDescriptor = serde_json::from_str(&content)
            .map_err(|e| SyncError::Descriptor(format!("{}: {e}", path.display())))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.columns.iter().any(|c| c.field == Field::Name) {
            return Err(SyncError::Descriptor(format!("{}: no name column", self.key)));
        }
        if !self.unit_scale.is_finite() || self.unit_scale <= 0.0 {
            return Err(SyncError::Descriptor(format!(
                "{}: unit_scale must be positive, got {}",
                self.key, self.unit_scale
            )));
        }
        let probabilities = self
            .probabilities
            .sections
            .values()
            .chain(self.probabilities.overrides.iter().map(|o| &o.probability))
            .chain(std::iter::once(&self.probabilities.default));
        for p in probabilities {
            if !(0.0..=1.0).contains(p) {
                return Err(SyncError::Descriptor(format!(
                    "{}: probability {p} outside [0, 1]",
                    self.key
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Built-in sources: enum dispatch, one variant per known sheet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceKind {
    BurcPipeline,
    BurcAttrition,
}

impl SourceKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::BurcPipeline => "burc-pipeline",
            Self::BurcAttrition => "burc-attrition",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BurcPipeline => "BURC Dial 2 pipeline",
            Self::BurcAttrition => "BURC attrition / revenue at risk",
        }
    }

    pub fn descriptor(&self) -> SourceDescriptor {
        match self {
            Self::BurcPipeline => burc_pipeline(),
            Self::BurcAttrition => burc_attrition(),
        }
    }
}

pub const ALL_SOURCES: &[SourceKind] = &[SourceKind::BurcPipeline, SourceKind::BurcAttrition];

pub fn get_by_key(key: &str) -> Option<SourceKind> {
    ALL_SOURCES.iter().find(|s| s.key() == key).copied()
}

fn burc_pipeline() -> SourceDescriptor {
    SourceDescriptor {
        key: SourceKind::BurcPipeline.key().to_string(),
        description: SourceKind::BurcPipeline.name().to_string(),
        sheet: "Dial 2 Risk Profile Summary".to_string(),
        table: "burc_pipeline_detail".to_string(),
        header_search_rows: default_header_search_rows(),
        columns: vec![
            ColumnSpec::new(Field::Name, &["Opportunity", "Opportunity Name", "Deal", "Deal Name"], Some(0)),
            ColumnSpec::new(Field::ForecastCategory, &["Forecast Category", "Category"], Some(1)),
            ColumnSpec::new(Field::Client, &["Client", "Account", "Account Name", "Customer"], None),
            ColumnSpec::new(Field::PrimaryAmount, &["Net Booking", "Net Bookings", "Net Booking ($)"], Some(24)),
            ColumnSpec::new(Field::FallbackAmount, &["TCV", "Total Contract Value", "Total Booking"], None),
            ColumnSpec::new(Field::Reference, &["Quote #", "Quote Number", "Oracle Quote", "Opportunity ID"], None),
            ColumnSpec::new(Field::CloseDate, &["Close Date", "Expected Close", "Forecast Close"], None),
        ],
        unit_scale: 1.0,
        classifier: ClassifierRules {
            markers: vec![
                SectionMarker::new("Green:", MatchType::Contains, "green", Some("Best Case")),
                SectionMarker::new("Yellow:", MatchType::Contains, "yellow", Some("Business Case")),
                SectionMarker::new("Red:", MatchType::Contains, "red", Some("Pipeline")),
                SectionMarker::new("Pipeline -", MatchType::StartsWith, "pipeline", Some("Pipeline")),
                SectionMarker::exclude("Closed", MatchType::StartsWith, "closed"),
                SectionMarker::exclude("Lost", MatchType::StartsWith, "lost"),
            ],
            summary_labels: default_summary_labels(),
        },
        probabilities: ProbabilityTable {
            sections: BTreeMap::from([
                ("green".to_string(), 0.9),
                ("yellow".to_string(), 0.5),
                ("red".to_string(), 0.2),
                ("pipeline".to_string(), 0.0),
            ]),
            overrides: vec![
                ProbabilityOverride {
                    section: Some("green".to_string()),
                    forecast_category: "Business Case".to_string(),
                    probability: 0.5,
                },
                ProbabilityOverride {
                    section: None,
                    forecast_category: "Omitted".to_string(),
                    probability: 0.0,
                },
            ],
            default: 0.0,
        },
        dedupe: DedupeStrategy::NameReference,
    }
}

fn burc_attrition() -> SourceDescriptor {
    SourceDescriptor {
        key: SourceKind::BurcAttrition.key().to_string(),
        description: SourceKind::BurcAttrition.name().to_string(),
        sheet: "Attrition".to_string(),
        table: "burc_attrition".to_string(),
        header_search_rows: default_header_search_rows(),
        columns: vec![
            ColumnSpec::new(Field::Client, &["Client", "Client Name", "Customer"], Some(0)),
            ColumnSpec::new(Field::Name, &["Product", "Solution", "Module"], Some(1)),
            ColumnSpec::new(Field::ForecastCategory, &["Type", "Attrition Type"], Some(2)),
            ColumnSpec::new(Field::PrimaryAmount, &["FY Revenue at Risk", "Revenue at Risk"], Some(3)),
            ColumnSpec::new(Field::FallbackAmount, &["Annual Value", "ARR"], None),
            ColumnSpec::new(Field::CloseDate, &["Forecast Date", "Exit Date"], None),
        ],
        // attrition values are kept in $'000
        unit_scale: 1000.0,
        classifier: ClassifierRules {
            markers: vec![
                SectionMarker::new("Confirmed", MatchType::StartsWith, "confirmed", None),
                SectionMarker::new("At Risk", MatchType::StartsWith, "at-risk", None),
                SectionMarker::exclude("Retained", MatchType::StartsWith, "retained"),
            ],
            summary_labels: default_summary_labels(),
        },
        probabilities: ProbabilityTable {
            sections: BTreeMap::from([
                ("confirmed".to_string(), 1.0),
                ("at-risk".to_string(), 0.5),
            ]),
            overrides: vec![],
            default: 0.0,
        },
        dedupe: DedupeStrategy::NameClient,
    }
}
