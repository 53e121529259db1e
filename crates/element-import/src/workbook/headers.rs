//! Two-row column headers.
//!
//! Row 1 holds section headers merged across several columns, row 2 the
//! per-column sub-headers. A merged cell only carries its text in the first
//! column, so the main header of a column is the nearest non-empty one to its
//! left, searched within the column's own section.

use super::grid::SheetGrid;
use super::range::RangeInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnHeader {
    pub index: usize,
    pub main: String,
    pub sub: String,
}

impl ColumnHeader {
    /// `main_sub`, or whichever half is present.
    pub fn combined(&self) -> String {
        match (self.main.is_empty(), self.sub.is_empty()) {
            (false, false) => format!("{}_{}", self.main, self.sub),
            (false, true) => self.main.clone(),
            _ => self.sub.clone(),
        }
    }

    /// Human-readable form for error messages.
    pub fn label(&self) -> String {
        match (self.main.is_empty(), self.sub.is_empty()) {
            (false, false) => format!("{} / {}", self.main, self.sub),
            (false, true) => self.main.clone(),
            _ => self.sub.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeaderRows {
    main: Vec<String>,
    sub: Vec<String>,
}

impl HeaderRows {
    pub fn from_sheet(sheet: &SheetGrid) -> Self {
        Self {
            main: sheet.row(0).to_vec(),
            sub: sheet.row(1).to_vec(),
        }
    }

    /// Header of `column`, which must lie inside `section`.
    pub fn header(&self, column: usize, section: RangeInfo) -> ColumnHeader {
        let lower = if section.is_empty() { column } else { section.start };
        let main = (lower..=column)
            .rev()
            .map(|c| cell(&self.main, c))
            .find(|text| !text.is_empty())
            .unwrap_or("")
            .to_string();

        ColumnHeader {
            index: column,
            main,
            sub: cell(&self.sub, column).to_string(),
        }
    }

    /// Headers of every column of `section`.
    pub fn section_headers(&self, section: RangeInfo) -> Vec<ColumnHeader> {
        section
            .columns()
            .map(|column| self.header(column, section))
            .collect()
    }
}

fn cell(row: &[String], column: usize) -> &str {
    row.get(column).map(String::as_str).unwrap_or("")
}
