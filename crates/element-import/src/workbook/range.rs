//! Column ranges of the workbook sections.
//!
//! Ranges normally come from the summary sheet. When the summary lacks a
//! hierarchy row its range is placed right after the drawing types, and when
//! the summary sheet is missing altogether every section width is derived
//! from the project's reference data.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::error::WorkbookError;
use super::grid::{SheetGrid, Workbook};

/// Fixed base columns `A..=J`.
pub const BASE_COLUMN_COUNT: usize = 10;

static RE_RANGE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*range\s*:\s*").unwrap());
static RE_CELL_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+)(\d*)$").unwrap());

/// Inclusive, zero-based column span. `count == 0` means the section has no
/// columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RangeInfo {
    pub start: usize,
    pub end: usize,
    pub count: usize,
}

impl RangeInfo {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            count: end + 1 - start,
        }
    }

    /// A span of `count` columns starting at `start`.
    pub fn with_count(start: usize, count: usize) -> Self {
        if count == 0 {
            Self::empty()
        } else {
            Self::new(start, start + count - 1)
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn columns(&self) -> Range<usize> {
        if self.is_empty() {
            0..0
        } else {
            self.start..self.end + 1
        }
    }

    /// First column after this span, or `fallback` when it is empty.
    pub fn next_or(&self, fallback: usize) -> usize {
        if self.is_empty() {
            fallback
        } else {
            self.end + 1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Base,
    DrawingTypes,
    Hierarchy,
    Stages,
    Bom,
}

impl Section {
    /// Maps a summary label such as `Total Drawing Types` to its section.
    pub fn from_label(label: &str) -> Option<Section> {
        let label = label.to_ascii_lowercase();
        if label.contains("base") {
            Some(Section::Base)
        } else if label.contains("drawing") {
            Some(Section::DrawingTypes)
        } else if label.contains("hierarch") {
            Some(Section::Hierarchy)
        } else if label.contains("stage") {
            Some(Section::Stages)
        } else if label.contains("bom") {
            Some(Section::Bom)
        } else {
            None
        }
    }
}

/// Where the ranges came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeSource {
    Summary,
    SummaryWithDerivedHierarchy,
    Derived,
}

/// Per-project reference counts used when ranges must be derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SectionCounts {
    pub drawing_types: usize,
    pub hierarchy: usize,
    pub stages: usize,
    pub boms: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionRanges {
    pub base: RangeInfo,
    pub drawing_types: RangeInfo,
    pub hierarchy: RangeInfo,
    pub stages: RangeInfo,
    pub bom: RangeInfo,
    pub source: RangeSource,
}

impl SectionRanges {
    /// Lays the sections out back to back after the base columns.
    pub fn derived(counts: SectionCounts) -> Self {
        let base = RangeInfo::with_count(0, BASE_COLUMN_COUNT);
        let drawing_types = RangeInfo::with_count(BASE_COLUMN_COUNT, counts.drawing_types);
        let hierarchy_start = BASE_COLUMN_COUNT + counts.drawing_types;
        let hierarchy = RangeInfo::with_count(hierarchy_start, counts.hierarchy);
        let stages_start = hierarchy_start + counts.hierarchy;
        let stages = RangeInfo::with_count(stages_start, counts.stages);
        let bom = RangeInfo::with_count(stages_start + counts.stages, counts.boms);

        Self {
            base,
            drawing_types,
            hierarchy,
            stages,
            bom,
            source: RangeSource::Derived,
        }
    }

    pub fn get(&self, section: Section) -> RangeInfo {
        match section {
            Section::Base => self.base,
            Section::DrawingTypes => self.drawing_types,
            Section::Hierarchy => self.hierarchy,
            Section::Stages => self.stages,
            Section::Bom => self.bom,
        }
    }

    /// Section owning `column`, if any.
    pub fn section_of(&self, column: usize) -> Option<Section> {
        [
            Section::Base,
            Section::DrawingTypes,
            Section::Hierarchy,
            Section::Stages,
            Section::Bom,
        ]
        .into_iter()
        .find(|section| self.get(*section).columns().contains(&column))
    }
}

/// Resolves section ranges for `workbook`.
///
/// `summary_sheet` names the summary sheet; `counts` is consulted only when
/// the summary is missing or lacks a hierarchy row.
pub fn resolve_ranges(
    workbook: &Workbook,
    summary_sheet: &str,
    counts: SectionCounts,
) -> Result<SectionRanges, WorkbookError> {
    let Some(summary) = workbook.sheet(summary_sheet) else {
        log::info!(
            "No '{}' sheet, deriving section widths from project data",
            summary_sheet
        );
        return Ok(SectionRanges::derived(counts));
    };

    let entries = parse_summary(summary)?;
    let lookup = |section: Section| entries.iter().find(|e| e.section == section);

    let base = lookup(Section::Base)
        .and_then(|e| e.range)
        .unwrap_or_else(|| RangeInfo::with_count(0, BASE_COLUMN_COUNT));
    let drawing_types = range_of(lookup(Section::DrawingTypes));
    let stages = range_of(lookup(Section::Stages));
    let bom = range_of(lookup(Section::Bom));

    let (hierarchy, source) = match lookup(Section::Hierarchy) {
        Some(entry) => (entry.range.unwrap_or_default(), RangeSource::Summary),
        None => {
            let start = drawing_types.next_or(base.next_or(BASE_COLUMN_COUNT));
            log::info!(
                "Summary has no hierarchy row, assuming {} column(s) from {}",
                counts.hierarchy,
                column_letters(start)
            );
            (
                RangeInfo::with_count(start, counts.hierarchy),
                RangeSource::SummaryWithDerivedHierarchy,
            )
        }
    };

    Ok(SectionRanges {
        base,
        drawing_types,
        hierarchy,
        stages,
        bom,
        source,
    })
}

fn range_of(entry: Option<&SummaryEntry>) -> RangeInfo {
    entry.and_then(|e| e.range).unwrap_or_default()
}

/// One recognized summary row.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryEntry {
    pub section: Section,
    pub count: usize,
    pub range: Option<RangeInfo>,
}

/// Parses `(label, count, range)` rows. Rows with unknown labels, such as a
/// header row, are ignored.
pub fn parse_summary(sheet: &SheetGrid) -> Result<Vec<SummaryEntry>, WorkbookError> {
    let filled = (0..sheet.height())
        .filter(|r| !sheet.is_blank_row(*r))
        .count();
    if filled < 2 {
        return Err(WorkbookError::InsufficientRows {
            sheet: sheet.name.clone(),
            required: 2,
            found: filled,
        });
    }

    let mut entries: Vec<SummaryEntry> = Vec::new();
    for row in 0..sheet.height() {
        let Some(section) = Section::from_label(sheet.cell(row, 0)) else {
            continue;
        };

        let count_cell = sheet.cell(row, 1);
        let declared = if count_cell.is_empty() {
            None
        } else {
            Some(
                count_cell
                    .parse::<f64>()
                    .ok()
                    .filter(|n| *n >= 0.0 && n.fract() == 0.0)
                    .map(|n| n as usize)
                    .ok_or_else(|| WorkbookError::MalformedSummary {
                        row: row + 1,
                        reason: format!("count '{}' is not a whole number", count_cell),
                    })?,
            )
        };

        let range = parse_range(sheet.cell(row, 2))?.map(|(start, end)| RangeInfo::new(start, end));
        if let (Some(range), Some(declared)) = (range, declared) {
            if range.count != declared {
                log::warn!(
                    "Summary row {} declares {} column(s) but its range spans {}",
                    row + 1,
                    declared,
                    range.count
                );
            }
        }

        if entries.iter().any(|e| e.section == section) {
            log::warn!("Duplicate summary row for {:?} ignored", section);
            continue;
        }

        entries.push(SummaryEntry {
            section,
            count: range.map(|r| r.count).unwrap_or(0),
            range,
        });
    }

    Ok(entries)
}

/// Parses a range such as `L1-R1`, `Range: $K$1:$L$1` or `M1` into
/// zero-based inclusive column indices. `0` or an empty value means the
/// section has no columns.
pub fn parse_range(raw: &str) -> Result<Option<(usize, usize)>, WorkbookError> {
    let cleaned = RE_RANGE_PREFIX.replace(raw.trim(), "").replace('$', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "0" {
        return Ok(None);
    }

    let parts: Vec<&str> = cleaned.split(['-', ':']).map(str::trim).collect();
    let (start, end) = match parts.as_slice() {
        [single] => {
            let col = parse_cell_ref(single)?;
            (col, col)
        }
        [from, to] => (parse_cell_ref(from)?, parse_cell_ref(to)?),
        _ => {
            return Err(WorkbookError::MalformedRange {
                range: raw.to_string(),
                reason: "expected START-END".to_string(),
            })
        }
    };

    if end < start {
        return Err(WorkbookError::MalformedRange {
            range: raw.to_string(),
            reason: format!(
                "end column {} precedes start column {}",
                column_letters(end),
                column_letters(start)
            ),
        });
    }

    Ok(Some((start, end)))
}

/// Column index of a cell reference like `AA12`; the row part is ignored.
fn parse_cell_ref(reference: &str) -> Result<usize, WorkbookError> {
    let invalid = || WorkbookError::InvalidColumn {
        reference: reference.to_string(),
    };
    let caps = RE_CELL_REF.captures(reference).ok_or_else(invalid)?;
    column_index(&caps[1]).ok_or_else(invalid)
}

/// `A` → 0, `Z` → 25, `AA` → 26. `None` for empty or non-letter input.
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut index: usize = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}

/// Inverse of [`column_index`].
pub fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}
