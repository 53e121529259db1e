//! Drawing attached to an element type.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "drawings")]
pub struct Model {
    /// Random identifier (UUID v4).
    #[sea_orm(primary_key, auto_increment = false)]
    pub drawings_id: String,
    pub project_id: i32,
    pub element_type_id: i32,
    pub drawing_type_id: i32,
    pub file: String,
    pub version: String,
    pub created_by: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
