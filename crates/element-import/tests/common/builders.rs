//! Builders for configs and workbooks used by the integration tests.
//!
//! The default element sheet matches the reference data seeded by
//! [`TestHarness`](super::TestHarness): two drawing types, the two floors of
//! tower G6, two stages and two BOM products, laid out as
//!
//! ```text
//! A..J base | K..L drawings | M..N hierarchy | O..P stages | Q..R BOM
//! ```

#![allow(dead_code)]

use element_import::config::Config;
use element_import::workbook::{SheetGrid, Workbook};

pub const ELEMENT_SHEET: &str = "Element Types";
pub const SUMMARY_SHEET: &str = "Summary";

pub const MAIN_HEADERS: [&str; 18] = [
    "Base", "", "", "", "", "", "", "", "", "", "Drawings", "", "Tower G6", "", "Stages", "",
    "BOM", "",
];
pub const SUB_HEADERS: [&str; 18] = [
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
    "GA",
    "Shop",
    "Floor 1",
    "Floor 2",
    "Casting",
    "Curing",
    "Cement",
    "Steel",
];

/// Builder for `Config` instances with test-friendly timings.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.database_url = "sqlite::memory:".to_string();
        config.import.monitor_interval_ms = 10;
        config.import.cancel_grace_ms = 20;
        config.import.drain_timeout_secs = 10;
        config.import.shutdown_timeout_secs = 10;
        config.import.progress_interval_secs = 1;
        Self { config }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.import.batch_size = batch_size;
        self
    }

    pub fn concurrent_batches(mut self, concurrent_batches: usize) -> Self {
        self.config.import.concurrent_batches = concurrent_batches;
        self
    }

    /// New jobs start with rollback enabled.
    pub fn rollback_by_default(mut self) -> Self {
        self.config.import.rollback_enabled_by_default = true;
        self
    }

    pub fn max_cell_quantity(mut self, max: i32) -> Self {
        self.config.import.max_cell_quantity = max;
        self
    }

    pub fn max_recorded_errors(mut self, max: usize) -> Self {
        self.config.import.max_recorded_errors = max;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the element sheet: two header rows, a sample row, then data.
pub struct ElementSheetBuilder {
    main: Vec<String>,
    sub: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ElementSheetBuilder {
    /// Headers covering every section.
    pub fn standard() -> Self {
        Self {
            main: MAIN_HEADERS.iter().map(|s| s.to_string()).collect(),
            sub: SUB_HEADERS.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Only the ten base columns.
    pub fn base_only() -> Self {
        Self {
            main: MAIN_HEADERS[..10].iter().map(|s| s.to_string()).collect(),
            sub: SUB_HEADERS[..10].iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Replaces the header pair of `column`.
    pub fn header(mut self, column: usize, main: &str, sub: &str) -> Self {
        self.main[column] = main.to_string();
        self.sub[column] = sub.to_string();
        self
    }

    pub fn row(mut self, cells: &[&str]) -> Self {
        self.rows.push(cells.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Appends a fully valid row placing `floor_1` and `floor_2` elements.
    pub fn element(mut self, code: &str, floor_1: &str, floor_2: &str) -> Self {
        self.rows.push(element_row(code, floor_1, floor_2));
        self
    }

    /// Appends `count` rows `E0001`, `E0002`, ... with one element on floor 1.
    pub fn elements(mut self, count: usize) -> Self {
        for i in 1..=count {
            self.rows.push(element_row(&format!("E{:04}", i), "1", ""));
        }
        self
    }

    pub fn build(self) -> SheetGrid {
        let mut rows = vec![self.main, self.sub, vec!["sample".to_string()]];
        rows.extend(self.rows);
        SheetGrid::new(ELEMENT_SHEET, rows)
    }
}

/// A valid data row: 3 x 6 x 0.2 m, 7200 kg, one GA drawing, both stages and
/// 1.5 units of cement.
pub fn element_row(code: &str, floor_1: &str, floor_2: &str) -> Vec<String> {
    let name = format!("{} panel", code);
    let drawing = format!("{}-ga.pdf", code.to_lowercase());
    [
        code,
        name.as_str(),
        "3",
        "6",
        "0.2",
        "7200",
        "3",
        "18",
        "0.2",
        "A",
        drawing.as_str(),
        "",
        floor_1,
        floor_2,
        "yes",
        "Y",
        "1.5",
        "",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Builder for the summary sheet.
pub struct SummaryBuilder {
    rows: Vec<Vec<String>>,
}

impl SummaryBuilder {
    /// Header row only.
    pub fn empty() -> Self {
        Self {
            rows: vec![vec![
                "Section".to_string(),
                "Count".to_string(),
                "Range".to_string(),
            ]],
        }
    }

    /// Summary matching [`ElementSheetBuilder::standard`].
    pub fn standard() -> Self {
        Self::empty()
            .entry("Base", "10", "A1-J1")
            .entry("Total Drawing Types", "2", "K1-L1")
            .entry("Hierarchy", "2", "M1-N1")
            .entry("Stages", "2", "O1-P1")
            .entry("BOM", "2", "Q1-R1")
    }

    pub fn entry(mut self, label: &str, count: &str, range: &str) -> Self {
        self.rows
            .push(vec![label.to_string(), count.to_string(), range.to_string()]);
        self
    }

    pub fn build(self) -> SheetGrid {
        SheetGrid::new(SUMMARY_SHEET, self.rows)
    }
}

/// Element sheet plus the standard summary.
pub fn workbook(sheet: ElementSheetBuilder) -> Workbook {
    Workbook::new(vec![sheet.build(), SummaryBuilder::standard().build()])
}

/// Element sheet without a summary sheet.
pub fn workbook_without_summary(sheet: ElementSheetBuilder) -> Workbook {
    Workbook::new(vec![sheet.build()])
}

pub fn workbook_with_summary(sheet: ElementSheetBuilder, summary: SummaryBuilder) -> Workbook {
    Workbook::new(vec![sheet.build(), summary.build()])
}
