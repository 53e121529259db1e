//! Project hierarchy node (tower, floor, zone). Read-only for the importer.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "precast")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,
    /// Dotted path of ltree-sanitized labels, e.g. `tower_g6.floor_1`.
    pub path: String,
    pub naming_convention: String,
    pub parent_id: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parent id when it is set and does not point at the node itself.
    pub fn real_parent(&self) -> Option<i32> {
        self.parent_id.filter(|parent| *parent != self.id)
    }
}
