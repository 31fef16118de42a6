//! Spreadsheet reading via calamine.
//!
//! The first sheet is read into a header row plus data rows of optional,
//! trimmed cell strings. Blank cells are `None`.

use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::Path;
use thiserror::Error;

/// Extensions calamine can open.
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

/// Errors raised while reading a spreadsheet.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("Failed to open spreadsheet {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: calamine::Error,
    },

    #[error("No sheets found in {0}")]
    NoSheets(String),

    #[error("Failed to read sheet '{sheet}': {source}")]
    Read {
        sheet: String,
        #[source]
        source: calamine::Error,
    },

    #[error("Spreadsheet {0} has no header row")]
    Empty(String),
}

/// A header row and its data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetTable {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl SheetTable {
    /// Read the first sheet of a workbook.
    pub fn open(path: &Path) -> Result<Self, SheetError> {
        let display = path.display().to_string();
        let mut workbook = open_workbook_auto(path).map_err(|source| SheetError::Open {
            path: display.clone(),
            source,
        })?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| SheetError::NoSheets(display.clone()))?;

        let range: Range<Data> =
            workbook
                .worksheet_range(&sheet_name)
                .map_err(|source| SheetError::Read {
                    sheet: sheet_name.clone(),
                    source,
                })?;

        Self::from_range(&range).ok_or(SheetError::Empty(display))
    }

    /// Build a table from a calamine range; `None` if there is no header row.
    fn from_range(range: &Range<Data>) -> Option<Self> {
        let mut rows = range.rows();
        let headers: Vec<String> = rows
            .next()?
            .iter()
            .map(|cell| cell_to_string(cell).unwrap_or_default())
            .collect();

        let width = headers.len();
        let rows = rows
            .map(|row| {
                let mut cells: Vec<Option<String>> =
                    row.iter().take(width).map(cell_to_string).collect();
                cells.resize(width, None);
                cells
            })
            .collect();

        Some(Self { headers, rows })
    }

    /// Build a table directly from headers and rows.
    pub fn from_parts(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row.into_iter()
                    .map(|cell| cell.map(|c| c.trim().to_string()))
                    .collect()
            })
            .collect();
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cells of one data row, padded to the header width.
    pub fn row(&self, row: usize) -> Option<&[Option<String>]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    /// Index of a column by exact header name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Trimmed cell value; `None` for a blank cell or a missing column.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col)?.as_deref()
    }

    /// Trimmed cell value, treating empty strings as missing.
    pub fn non_empty(&self, row: usize, column: &str) -> Option<&str> {
        self.cell(row, column).filter(|s| !s.is_empty())
    }
}

fn cell_to_string(cell: &Data) -> Option<String> {
    let value = match cell {
        Data::Empty => return None,
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) => return None,
    };
    Some(value)
}

/// Whether a path has a spreadsheet extension.
pub fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SPREADSHEET_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
