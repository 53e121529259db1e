//! In-memory view of a workbook: every sheet as a grid of trimmed strings.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use super::error::WorkbookError;

/// One worksheet. Row and column indices are zero-based and absolute, so a
/// sheet whose used range starts at `B3` still has `cell(2, 1)` as its first
/// value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetGrid {
    pub name: String,
    rows: Vec<Vec<String>>,
}

impl SheetGrid {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Builds a grid from string literals.
    pub fn from_strs(name: &str, rows: &[&[&str]]) -> Self {
        Self::new(
            name,
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    /// Cell text, or `""` outside the used range.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn row(&self, row: usize) -> &[String] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_blank_row(&self, row: usize) -> bool {
        self.row(row).iter().all(|cell| cell.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    sheets: Vec<SheetGrid>,
}

impl Workbook {
    pub fn new(sheets: Vec<SheetGrid>) -> Self {
        Self { sheets }
    }

    /// Finds a sheet by name, ignoring case and surrounding whitespace.
    pub fn sheet(&self, name: &str) -> Option<&SheetGrid> {
        let wanted = name.trim();
        self.sheets
            .iter()
            .find(|s| s.name.trim().eq_ignore_ascii_case(wanted))
    }

    pub fn require_sheet(&self, name: &str) -> Result<&SheetGrid, WorkbookError> {
        self.sheet(name).ok_or_else(|| WorkbookError::MissingSheet {
            sheet: name.to_string(),
        })
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|s| s.name.as_str())
    }
}

/// Source of workbooks. The import service only sees this trait, so tests can
/// feed grids without touching the filesystem.
pub trait WorkbookLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Workbook, WorkbookError>;
}

/// Reads `.xlsx`, `.xlsm`, `.xls` and `.ods` files with calamine.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalamineLoader;

impl CalamineLoader {
    pub fn new() -> Self {
        Self
    }
}

impl WorkbookLoader for CalamineLoader {
    fn load(&self, path: &Path) -> Result<Workbook, WorkbookError> {
        let open_error = |message: String| WorkbookError::Open {
            path: path.to_path_buf(),
            message,
        };

        let mut workbook = open_workbook_auto(path).map_err(|e| open_error(e.to_string()))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| open_error(format!("sheet '{}': {}", name, e)))?;

            let (row_offset, col_offset) = range
                .start()
                .map(|(r, c)| (r as usize, c as usize))
                .unwrap_or((0, 0));

            let mut rows: Vec<Vec<String>> = vec![Vec::new(); row_offset];
            for data_row in range.rows() {
                let mut cells = vec![String::new(); col_offset];
                cells.extend(data_row.iter().map(cell_text));
                rows.push(cells);
            }

            log::debug!("Read sheet '{}' with {} rows", name, rows.len());
            sheets.push(SheetGrid::new(name, rows));
        }

        Ok(Workbook::new(sheets))
    }
}

/// Normalizes a calamine cell into trimmed text. Integral floats lose their
/// fractional part so `3.0` reads as `3`.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string().trim().to_string(),
    }
}
