use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{SectionContext, SourceRow};

pub const UNSECTIONED: &str = "unsectioned";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    Contains,
    StartsWith,
    Regex,
}

fn matches(label: &str, pattern: &str, match_type: MatchType) -> bool {
    let label_upper = label.to_uppercase();
    let pat_upper = pattern.to_uppercase();
    match match_type {
        MatchType::Contains => label_upper.contains(&pat_upper),
        MatchType::StartsWith => label_upper.starts_with(&pat_upper),
        MatchType::Regex => Regex::new(pattern)
            .map(|re| re.is_match(label))
            .unwrap_or(false),
    }
}

/// A row whose first cell opens a new section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionMarker {
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
    pub section: String,
    #[serde(default)]
    pub forecast_category: Option<String>,
    /// Closed/lost style markers: rows below are tagged and later dropped.
    #[serde(default)]
    pub exclude: bool,
}

impl SectionMarker {
    pub fn new(pattern: &str, match_type: MatchType, section: &str, forecast_category: Option<&str>) -> Self {
        Self {
            pattern: pattern.to_string(),
            match_type,
            section: section.to_string(),
            forecast_category: forecast_category.map(str::to_string),
            exclude: false,
        }
    }

    pub fn exclude(pattern: &str, match_type: MatchType, section: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            match_type,
            section: section.to_string(),
            forecast_category: None,
            exclude: true,
        }
    }

    pub fn context(&self) -> SectionContext {
        if self.exclude {
            SectionContext::excluded(&self.section)
        } else {
            SectionContext::new(&self.section, self.forecast_category.as_deref())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRules {
    #[serde(default)]
    pub markers: Vec<SectionMarker>,
    /// Labels of total/subtotal rows, matched case-insensitively as a leading word.
    #[serde(default = "default_summary_labels")]
    pub summary_labels: Vec<String>,
}

pub fn default_summary_labels() -> Vec<String> {
    ["Grand Total", "Total", "Totals", "Subtotal", "Sub-total", "Sub Total"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            markers: Vec::new(),
            summary_labels: default_summary_labels(),
        }
    }
}

impl ClassifierRules {
    /// Context used before any marker has been seen: the first defined
    /// (non-exclude) section.
    pub fn default_context(&self) -> SectionContext {
        self.markers
            .iter()
            .find(|m| !m.exclude)
            .map(SectionMarker::context)
            .unwrap_or_else(|| SectionContext::new(UNSECTIONED, None))
    }

    pub fn marker_for(&self, label: &str) -> Option<&SectionMarker> {
        self.markers
            .iter()
            .find(|m| matches(label, &m.pattern, m.match_type))
    }

    /// A summary label matches the whole first cell or a leading word of it:
    /// "Total Green" is a total row, "Totalcare EMR Renewal" is a deal.
    pub fn is_summary(&self, label: &str) -> bool {
        let label = label.trim().to_uppercase();
        self.summary_labels.iter().any(|s| {
            label
                .strip_prefix(&s.to_uppercase())
                .is_some_and(|rest| rest.chars().next().is_none_or(|c| !c.is_alphanumeric()))
        })
    }
}

/// A data row paired with the section context active when it was read.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRow<'a> {
    pub row: &'a SourceRow,
    pub context: SectionContext,
}

/// Tag every data row with the most recent marker above it.
///
/// Marker rows and summary rows are consumed, rows without a first-cell
/// value are skipped. Rows under an exclude marker are still emitted, with
/// `context.excluded` set.
pub fn classify<'a>(rows: &'a [SourceRow], rules: &ClassifierRules) -> Vec<ClassifiedRow<'a>> {
    let (_, classified) = rows.iter().fold(
        (rules.default_context(), Vec::new()),
        |(context, mut out), row| {
            let Some(label) = row.first_text() else {
                return (context, out);
            };
            if let Some(marker) = rules.marker_for(&label) {
                log::debug!("row {}: section marker {:?} -> {}", row.index, label, marker.section);
                return (marker.context(), out);
            }
            if rules.is_summary(&label) {
                return (context, out);
            }
            out.push(ClassifiedRow {
                row,
                context: context.clone(),
            });
            (context, out)
        },
    );
    classified
}
