//! Declared number of elements of a type at one hierarchy position.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "element_type_hierarchy_quantity")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub element_type_id: i32,
    /// References `precast.id` within the same project.
    pub hierarchy_id: i32,
    pub project_id: i32,
    pub quantity: i32,
    /// Naming convention stored on the precast node, not the workbook spelling.
    pub naming_convention: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
