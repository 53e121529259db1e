//! Per-project lookup tables used while decoding rows.

use std::collections::HashMap;

use sea_orm::ConnectionTrait;

use crate::db::catalog_repo::{self, ReferenceData};
use crate::db::entities::precast;
use crate::db::DatabaseError;
use crate::hierarchy::{normalize_name, PrecastIndex};
use crate::workbook::{ColumnHeader, SectionCounts};

/// A BOM product matched by a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BomProduct {
    pub product_id: i32,
    pub product_name: String,
}

/// Reference data of one project, keyed by normalized name.
#[derive(Debug, Clone, Default)]
pub struct ProjectCatalog {
    project_id: i32,
    drawing_types: HashMap<String, i32>,
    stages: HashMap<String, i32>,
    boms: HashMap<String, BomProduct>,
    precast: PrecastIndex,
    /// Rows loaded per table, duplicates included.
    drawing_type_rows: usize,
    stage_rows: usize,
    bom_rows: usize,
}

impl ProjectCatalog {
    pub async fn load<C: ConnectionTrait>(
        conn: &C,
        project_id: i32,
    ) -> Result<Self, DatabaseError> {
        let data = catalog_repo::load_reference_data(conn, project_id).await?;
        Ok(Self::from_reference_data(project_id, data))
    }

    pub fn from_reference_data(project_id: i32, data: ReferenceData) -> Self {
        let mut builder = CatalogBuilder::new(project_id);
        for dt in data.drawing_types {
            builder = builder.drawing_type(dt.drawing_type_id, &dt.drawing_type_name);
        }
        for stage in data.stages {
            builder = builder.stage(stage.id, &stage.name);
        }
        for bom in data.boms {
            builder = builder.bom(bom.id, &bom.product_name);
        }
        builder.precast_nodes(data.precast).build()
    }

    pub fn builder(project_id: i32) -> CatalogBuilder {
        CatalogBuilder::new(project_id)
    }

    pub fn project_id(&self) -> i32 {
        self.project_id
    }

    pub fn precast(&self) -> &PrecastIndex {
        &self.precast
    }

    /// Drawing type named `main_sub`, falling back to either half.
    pub fn drawing_type_id(&self, header: &ColumnHeader) -> Option<i32> {
        lookup(
            &self.drawing_types,
            [header.combined(), header.sub.clone(), header.main.clone()],
        )
        .copied()
    }

    /// Stage named by the sub-header, falling back to the combined name.
    pub fn stage_id(&self, header: &ColumnHeader) -> Option<i32> {
        lookup(
            &self.stages,
            [header.sub.clone(), header.combined(), header.main.clone()],
        )
        .copied()
    }

    pub fn bom(&self, header: &ColumnHeader) -> Option<&BomProduct> {
        lookup(
            &self.boms,
            [header.combined(), header.sub.clone(), header.main.clone()],
        )
    }

    /// Widths used when section ranges have to be derived: one column per
    /// reference row, even when two rows share a name.
    pub fn counts(&self) -> SectionCounts {
        SectionCounts {
            drawing_types: self.drawing_type_rows,
            hierarchy: self.precast.placement_count(),
            stages: self.stage_rows,
            boms: self.bom_rows,
        }
    }
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, candidates: [String; 3]) -> Option<&'a T> {
    candidates
        .iter()
        .map(|name| normalize_name(name))
        .filter(|key| !key.is_empty())
        .find_map(|key| map.get(&key))
}

/// Assembles a [`ProjectCatalog`] entry by entry.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    catalog: ProjectCatalog,
    precast: Vec<precast::Model>,
}

impl CatalogBuilder {
    pub fn new(project_id: i32) -> Self {
        Self {
            catalog: ProjectCatalog {
                project_id,
                ..Default::default()
            },
            precast: Vec::new(),
        }
    }

    pub fn drawing_type(mut self, id: i32, name: &str) -> Self {
        self.catalog.drawing_type_rows += 1;
        insert_unique(&mut self.catalog.drawing_types, name, id, "drawing type");
        self
    }

    pub fn stage(mut self, id: i32, name: &str) -> Self {
        self.catalog.stage_rows += 1;
        insert_unique(&mut self.catalog.stages, name, id, "stage");
        self
    }

    pub fn bom(mut self, product_id: i32, product_name: &str) -> Self {
        self.catalog.bom_rows += 1;
        let product = BomProduct {
            product_id,
            product_name: product_name.to_string(),
        };
        insert_unique(&mut self.catalog.boms, product_name, product, "BOM product");
        self
    }

    pub fn precast_nodes(mut self, nodes: Vec<precast::Model>) -> Self {
        self.precast.extend(nodes);
        self
    }

    pub fn build(mut self) -> ProjectCatalog {
        self.catalog.precast = PrecastIndex::new(self.precast);
        self.catalog
    }
}

/// First entry wins for names that normalize to the same key.
fn insert_unique<T>(map: &mut HashMap<String, T>, name: &str, value: T, kind: &str) {
    let key = normalize_name(name);
    if key.is_empty() {
        return;
    }
    if map.contains_key(&key) {
        log::warn!("Ignoring duplicate {} name '{}'", kind, name);
        return;
    }
    map.insert(key, value);
}
