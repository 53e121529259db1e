use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Structural problems that make a workbook unusable. Raised before any job
/// row is written.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkbookError {
    #[error("Failed to open workbook '{path}': {message}")]
    Open { path: PathBuf, message: String },

    #[error("Workbook has no '{sheet}' sheet")]
    MissingSheet { sheet: String },

    #[error("Sheet '{sheet}' needs at least {required} rows, found {found}")]
    InsufficientRows {
        sheet: String,
        required: usize,
        found: usize,
    },

    #[error("Invalid column reference '{reference}'")]
    InvalidColumn { reference: String },

    #[error("Malformed range '{range}': {reason}")]
    MalformedRange { range: String, reason: String },

    #[error("Malformed summary row {row}: {reason}")]
    MalformedSummary { row: usize, reason: String },
}

/// One problem found while decoding a data row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowIssue {
    /// A numeric cell holds something else.
    NotNumeric { column: String, value: String },
    /// A required base cell is empty.
    MissingValue { column: String },
    UnknownDrawingType { header: String },
    UnknownStage { header: String },
    UnknownBom { header: String },
    UnknownHierarchy { header: String, tried: Vec<String> },
    /// A hierarchy cell exceeds the configured per-cell ceiling.
    QuantityTooLarge { column: String, value: i32, limit: i32 },
    /// The hierarchy quantities of the row do not sum to a storable count.
    TotalOverflow,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowIssue::NotNumeric { column, value } => {
                write!(f, "'{}' is not a number in column {}", value, column)
            }
            RowIssue::MissingValue { column } => write!(f, "missing value for {}", column),
            RowIssue::UnknownDrawingType { header } => {
                write!(f, "unknown drawing type '{}'", header)
            }
            RowIssue::UnknownStage { header } => write!(f, "unknown stage '{}'", header),
            RowIssue::UnknownBom { header } => write!(f, "unknown BOM product '{}'", header),
            RowIssue::UnknownHierarchy { header, tried } => write!(
                f,
                "hierarchy '{}' not found (tried {})",
                header,
                tried.join(", ")
            ),
            RowIssue::QuantityTooLarge {
                column,
                value,
                limit,
            } => write!(
                f,
                "quantity {} in column {} exceeds the limit of {}",
                value, column, limit
            ),
            RowIssue::TotalOverflow => write!(f, "total element count is too large"),
        }
    }
}

/// A data row that could not be decoded. `row` is 1-based, as shown in a
/// spreadsheet application.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Row {row}: {}", .issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct RowError {
    pub row: usize,
    pub issues: Vec<RowIssue>,
}
