//! Workbook access and decoding.
//!
//! [`grid`] loads sheets, [`range`] finds the column span of every section,
//! [`headers`] names the columns and [`decoder`] turns data rows into
//! [`ElementTypeDraft`]s.

pub mod decoder;
pub mod error;
pub mod grid;
pub mod headers;
pub mod model;
pub mod range;

pub use decoder::{count_data_rows, RowDecoder};
pub use error::{RowError, RowIssue, WorkbookError};
pub use grid::{CalamineLoader, SheetGrid, Workbook, WorkbookLoader};
pub use headers::{ColumnHeader, HeaderRows};
pub use model::{BomDraft, DrawingDraft, ElementTypeDraft, Geometry, HierarchyDraft};
pub use range::{
    resolve_ranges, RangeInfo, RangeSource, Section, SectionCounts, SectionRanges,
};
