use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{Data, Range, Reader, Sheets};

use crate::error::{Result, SyncError};
use crate::models::{Cell, SourceRow};

/// An open spreadsheet (xlsx, xlsm, xlsb or xls).
pub struct Workbook {
    path: PathBuf,
    sheets: Sheets<BufReader<File>>,
}

impl Workbook {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SyncError::Other(format!("File not found: {}", path.display())));
        }
        let sheets = calamine::open_workbook_auto(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            sheets,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string()
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    /// Rows of the named sheet, or `None` when the sheet is missing or
    /// unreadable. Sheet names are matched exactly first, then ignoring case
    /// and surrounding whitespace.
    pub fn read_sheet(&mut self, name: &str) -> Option<Vec<SourceRow>> {
        let names = self.sheet_names();
        let Some(actual) = names
            .iter()
            .find(|n| n.as_str() == name)
            .or_else(|| names.iter().find(|n| n.trim().eq_ignore_ascii_case(name.trim())))
            .cloned()
        else {
            log::warn!("{}: sheet {:?} not found (have: {})", self.file_name(), name, names.join(", "));
            return None;
        };
        match self.sheets.worksheet_range(&actual) {
            Ok(range) => Some(range_to_rows(&range)),
            Err(e) => {
                log::warn!("{}: could not read sheet {:?}: {e}", self.file_name(), actual);
                None
            }
        }
    }
}

/// Convert a calamine range to rows with absolute indices. calamine trims
/// leading empty rows/columns, so the range origin is added back.
pub fn range_to_rows(range: &Range<Data>) -> Vec<SourceRow> {
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));
    range
        .rows()
        .enumerate()
        .map(|(i, cells)| {
            let mut row = vec![Cell::Empty; col_offset];
            row.extend(cells.iter().map(to_cell));
            SourceRow::new(row_offset + i, row)
        })
        .collect()
}

pub fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) | Data::Empty => Cell::Empty,
    }
}
