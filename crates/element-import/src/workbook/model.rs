//! Decoded rows, ready for persistence.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Geometry {
    pub height: f64,
    pub length: f64,
    pub thickness: f64,
    pub mass: f64,
    pub volume: f64,
    pub area: f64,
    pub width: f64,
}

impl Geometry {
    /// `mass / volume`, or 0 when the volume is not positive.
    pub fn density(&self) -> f64 {
        if self.volume > 0.0 {
            self.mass / self.volume
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawingDraft {
    /// Random identifier, also the primary key of the drawing row.
    pub drawings_id: String,
    pub drawing_type_id: i32,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyDraft {
    pub hierarchy_id: i32,
    pub quantity: i32,
    /// Stored precast name of the node.
    pub naming_convention: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BomDraft {
    pub product_id: i32,
    pub product_name: String,
    pub quantity: f64,
}

/// One decoded data row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementTypeDraft {
    /// 1-based sheet row.
    pub row: usize,
    pub element_type: String,
    pub name: String,
    pub geometry: Geometry,
    pub version: String,
    pub drawings: Vec<DrawingDraft>,
    pub hierarchy: Vec<HierarchyDraft>,
    /// Ordered `project_stages.id` values.
    pub stage_path: Vec<i32>,
    pub bom: Vec<BomDraft>,
    pub created_by: String,
}

impl ElementTypeDraft {
    /// Elements to generate: the sum of all hierarchy quantities, or `None`
    /// when it does not fit the `total_count_element` column.
    pub fn total_count(&self) -> Option<i32> {
        self.hierarchy
            .iter()
            .try_fold(0i32, |total, h| total.checked_add(h.quantity))
    }
}
