//! Writes real `.xlsx` files so imports can run through `CalamineLoader`.
//!
//! Cells that parse as numbers are stored as numbers, everything else as
//! inline strings. Blank cells are left out, the way spreadsheet
//! applications save them.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use element_import::workbook::range::column_letters;
use element_import::workbook::SheetGrid;

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// One worksheet of a file written by [`write_xlsx`].
pub struct XlsxSheet {
    grid: SheetGrid,
    origin: (usize, usize),
    merges: Vec<String>,
}

impl XlsxSheet {
    pub fn new(grid: SheetGrid) -> Self {
        Self {
            grid,
            origin: (0, 0),
            merges: Vec::new(),
        }
    }

    /// Shifts every cell down by `rows` and right by `cols`.
    pub fn at(mut self, rows: usize, cols: usize) -> Self {
        self.origin = (rows, cols);
        self
    }

    /// Adds a merged region such as `K1:L1`.
    pub fn merge(mut self, range: &str) -> Self {
        self.merges.push(range.to_string());
        self
    }

    fn xml(&self) -> String {
        let mut xml = format!(r#"{}<worksheet xmlns="{}"><sheetData>"#, XML_DECL, MAIN_NS);
        for r in 0..self.grid.height() {
            if self.grid.is_blank_row(r) {
                continue;
            }
            let row_number = r + self.origin.0 + 1;
            xml.push_str(&format!(r#"<row r="{}">"#, row_number));
            for (c, value) in self.grid.row(r).iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let reference = format!("{}{}", column_letters(c + self.origin.1), row_number);
                if value.parse::<f64>().is_ok_and(|v| v.is_finite()) {
                    xml.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, value));
                } else {
                    xml.push_str(&format!(
                        r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                        reference,
                        escape(value)
                    ));
                }
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData>");
        if !self.merges.is_empty() {
            xml.push_str(&format!(r#"<mergeCells count="{}">"#, self.merges.len()));
            for range in &self.merges {
                xml.push_str(&format!(r#"<mergeCell ref="{}"/>"#, range));
            }
            xml.push_str("</mergeCells>");
        }
        xml.push_str("</worksheet>");
        xml
    }
}

/// Writes `sheets`, in order, as a minimal workbook at `path`.
pub fn write_xlsx(path: &Path, sheets: &[XlsxSheet]) {
    let file = File::create(path).expect("Failed to create workbook file");
    let mut zip = ZipWriter::new(file);

    let mut put = |name: String, content: String| {
        zip.start_file(name, SimpleFileOptions::default())
            .expect("Failed to add zip entry");
        zip.write_all(content.as_bytes())
            .expect("Failed to write zip entry");
    };

    let mut overrides = String::new();
    let mut entries = String::new();
    let mut relationships = String::new();
    for (i, sheet) in sheets.iter().enumerate() {
        let n = i + 1;
        overrides.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            n
        ));
        entries.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape(&sheet.grid.name),
            n,
            n
        ));
        relationships.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="{}/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            n, REL_NS, n
        ));
    }

    put(
        "[Content_Types].xml".to_string(),
        format!(
            r#"{}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>{}</Types>"#,
            XML_DECL, overrides
        ),
    );
    put(
        "_rels/.rels".to_string(),
        format!(
            r#"{}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
            XML_DECL, REL_NS
        ),
    );
    put(
        "xl/workbook.xml".to_string(),
        format!(
            r#"{}<workbook xmlns="{}" xmlns:r="{}"><sheets>{}</sheets></workbook>"#,
            XML_DECL, MAIN_NS, REL_NS, entries
        ),
    );
    put(
        "xl/_rels/workbook.xml.rels".to_string(),
        format!(
            r#"{}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{}</Relationships>"#,
            XML_DECL, relationships
        ),
    );
    for (i, sheet) in sheets.iter().enumerate() {
        put(format!("xl/worksheets/sheet{}.xml", i + 1), sheet.xml());
    }

    zip.finish().expect("Failed to finish workbook file");
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
