use serde_json::Value;

use crate::error::Result;

pub type Row = serde_json::Map<String, Value>;

/// Equality filter on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            value: value.into(),
        }
    }

    /// Value as it appears in a query string.
    pub fn value_text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// The generic query/insert/delete surface of the relational store.
///
/// There is no transaction spanning calls; a single `insert` call is the
/// unit that either lands or fails.
pub trait TableStore {
    fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>>;
    fn insert(&self, table: &str, rows: &[Row]) -> Result<usize>;
    fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize>;
}

/// Table and column names are interpolated into SQL and URLs, so only plain
/// identifiers are accepted.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
