//! Lazy decoding of the element sheet into [`ElementTypeDraft`]s.

use uuid::Uuid;

use super::error::{RowError, RowIssue};
use super::grid::SheetGrid;
use super::headers::{ColumnHeader, HeaderRows};
use super::model::{BomDraft, DrawingDraft, ElementTypeDraft, Geometry, HierarchyDraft};
use super::range::{column_letters, SectionRanges};
use crate::catalog::ProjectCatalog;
use crate::hierarchy::HierarchyResolver;

/// Base columns in sheet order.
pub const BASE_COLUMNS: [&str; 10] = [
    "element_type",
    "element_type_name",
    "height",
    "length",
    "thickness",
    "mass",
    "volume",
    "area",
    "width",
    "version",
];

/// Version given to rows that leave the version cell empty.
const DEFAULT_VERSION: &str = "1";

/// Iterates data rows from `data_start_row` (1-based) onward, skipping blank
/// rows. Each item is either a decoded row or the problems that kept it from
/// decoding.
pub struct RowDecoder<'a> {
    sheet: &'a SheetGrid,
    ranges: SectionRanges,
    catalog: &'a ProjectCatalog,
    resolver: HierarchyResolver<'a>,
    created_by: String,
    drawing_headers: Vec<ColumnHeader>,
    hierarchy_headers: Vec<ColumnHeader>,
    stage_headers: Vec<ColumnHeader>,
    bom_headers: Vec<ColumnHeader>,
    max_cell_quantity: i32,
    next_row: usize,
}

impl<'a> RowDecoder<'a> {
    pub fn new(
        sheet: &'a SheetGrid,
        ranges: SectionRanges,
        catalog: &'a ProjectCatalog,
        resolver: HierarchyResolver<'a>,
        data_start_row: usize,
        created_by: impl Into<String>,
    ) -> Self {
        let headers = HeaderRows::from_sheet(sheet);
        Self {
            sheet,
            ranges,
            catalog,
            resolver,
            created_by: created_by.into(),
            drawing_headers: headers.section_headers(ranges.drawing_types),
            hierarchy_headers: headers.section_headers(ranges.hierarchy),
            stage_headers: headers.section_headers(ranges.stages),
            bom_headers: headers.section_headers(ranges.bom),
            max_cell_quantity: i32::MAX,
            next_row: data_start_row.saturating_sub(1),
        }
    }

    /// Rejects hierarchy cells above `limit`.
    pub fn with_max_cell_quantity(mut self, limit: i32) -> Self {
        self.max_cell_quantity = limit;
        self
    }

    fn decode_row(&self, row: usize) -> Result<ElementTypeDraft, RowError> {
        let mut issues = Vec::new();
        let base = |i: usize| self.sheet.cell(row, self.ranges.base.start + i);

        let element_type = base(0).to_string();
        if element_type.is_empty() {
            issues.push(RowIssue::MissingValue {
                column: BASE_COLUMNS[0].to_string(),
            });
        }
        let name = base(1).to_string();
        if name.is_empty() {
            issues.push(RowIssue::MissingValue {
                column: BASE_COLUMNS[1].to_string(),
            });
        }

        let mut number = |i: usize| -> f64 {
            let raw = base(i);
            if raw.is_empty() {
                return 0.0;
            }
            match raw.parse::<f64>() {
                Ok(value) if value.is_finite() => value,
                _ => {
                    issues.push(RowIssue::NotNumeric {
                        column: BASE_COLUMNS[i].to_string(),
                        value: raw.to_string(),
                    });
                    0.0
                }
            }
        };
        let geometry = Geometry {
            height: number(2),
            length: number(3),
            thickness: number(4),
            mass: number(5),
            volume: number(6),
            area: number(7),
            width: number(8),
        };

        let version = match base(9) {
            "" => DEFAULT_VERSION.to_string(),
            v => v.to_string(),
        };

        let stage_path = self.decode_stages(row, &mut issues);
        let drawings = self.decode_drawings(row, &mut issues);
        let hierarchy = self.decode_hierarchy(row, &mut issues);
        let total = hierarchy
            .iter()
            .try_fold(0i32, |total, h| total.checked_add(h.quantity));
        if total.is_none() {
            issues.push(RowIssue::TotalOverflow);
        }
        let bom = self.decode_bom(row, &mut issues);

        if !issues.is_empty() {
            return Err(RowError {
                row: row + 1,
                issues,
            });
        }

        Ok(ElementTypeDraft {
            row: row + 1,
            element_type,
            name,
            geometry,
            version,
            drawings,
            hierarchy,
            stage_path,
            bom,
            created_by: self.created_by.clone(),
        })
    }

    fn decode_stages(&self, row: usize, issues: &mut Vec<RowIssue>) -> Vec<i32> {
        let mut path = Vec::new();
        for header in &self.stage_headers {
            if !is_affirmative(self.sheet.cell(row, header.index)) {
                continue;
            }
            match self.catalog.stage_id(header) {
                Some(id) if !path.contains(&id) => path.push(id),
                Some(_) => {}
                None => issues.push(RowIssue::UnknownStage {
                    header: header.label(),
                }),
            }
        }
        path
    }

    fn decode_drawings(&self, row: usize, issues: &mut Vec<RowIssue>) -> Vec<DrawingDraft> {
        let mut drawings = Vec::new();
        for header in &self.drawing_headers {
            let file = self.sheet.cell(row, header.index);
            if file.is_empty() {
                continue;
            }
            match self.catalog.drawing_type_id(header) {
                Some(drawing_type_id) => drawings.push(DrawingDraft {
                    drawings_id: Uuid::new_v4().to_string(),
                    drawing_type_id,
                    file: file.to_string(),
                }),
                None => issues.push(RowIssue::UnknownDrawingType {
                    header: header.label(),
                }),
            }
        }
        drawings
    }

    fn decode_hierarchy(&self, row: usize, issues: &mut Vec<RowIssue>) -> Vec<HierarchyDraft> {
        let mut hierarchy = Vec::new();
        for header in &self.hierarchy_headers {
            let raw = self.sheet.cell(row, header.index);
            let column = || format!("{} ({})", header.label(), column_letters(header.index));
            let quantity = match parse_quantity(raw) {
                Ok(Some(quantity)) if quantity > self.max_cell_quantity => {
                    issues.push(RowIssue::QuantityTooLarge {
                        column: column(),
                        value: quantity,
                        limit: self.max_cell_quantity,
                    });
                    continue;
                }
                Ok(Some(quantity)) => quantity,
                Ok(None) => continue,
                Err(()) => {
                    issues.push(RowIssue::NotNumeric {
                        column: column(),
                        value: raw.to_string(),
                    });
                    continue;
                }
            };
            match self.resolver.resolve_header(header) {
                Ok(resolved) => hierarchy.push(HierarchyDraft {
                    hierarchy_id: resolved.hierarchy_id,
                    quantity,
                    naming_convention: resolved.naming_convention,
                }),
                Err(tried) => issues.push(RowIssue::UnknownHierarchy {
                    header: header.label(),
                    tried,
                }),
            }
        }
        hierarchy
    }

    fn decode_bom(&self, row: usize, issues: &mut Vec<RowIssue>) -> Vec<BomDraft> {
        let mut bom = Vec::new();
        for header in &self.bom_headers {
            let raw = self.sheet.cell(row, header.index);
            if raw.is_empty() {
                continue;
            }
            let quantity = match raw.parse::<f64>() {
                Ok(q) if q.is_finite() => q,
                _ => {
                    issues.push(RowIssue::NotNumeric {
                        column: format!("{} ({})", header.label(), column_letters(header.index)),
                        value: raw.to_string(),
                    });
                    continue;
                }
            };
            if quantity == 0.0 {
                continue;
            }
            match self.catalog.bom(header) {
                Some(product) => bom.push(BomDraft {
                    product_id: product.product_id,
                    product_name: product.product_name.clone(),
                    quantity,
                }),
                None => issues.push(RowIssue::UnknownBom {
                    header: header.label(),
                }),
            }
        }
        bom
    }
}

impl Iterator for RowDecoder<'_> {
    type Item = Result<ElementTypeDraft, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_row < self.sheet.height() {
            let row = self.next_row;
            self.next_row += 1;
            if self.sheet.is_blank_row(row) {
                continue;
            }
            return Some(self.decode_row(row));
        }
        None
    }
}

/// Non-blank rows from `data_start_row` (1-based) onward.
pub fn count_data_rows(sheet: &SheetGrid, data_start_row: usize) -> usize {
    (data_start_row.saturating_sub(1)..sheet.height())
        .filter(|row| !sheet.is_blank_row(*row))
        .count()
}

/// `yes`, `y`, `true` or `1`, ignoring case.
pub fn is_affirmative(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "yes" | "y" | "true" | "1"
    )
}

/// Positive whole quantity; `None` for empty or zero cells.
fn parse_quantity(raw: &str) -> Result<Option<i32>, ()> {
    if raw.is_empty() {
        return Ok(None);
    }
    let value: f64 = raw.parse().map_err(|_| ())?;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > i32::MAX as f64 {
        return Err(());
    }
    let quantity = value as i32;
    Ok((quantity > 0).then_some(quantity))
}
