//! Drawing revision history. Written by the drawings workflow, removed by rollback.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "drawings_revision")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub drawings_id: String,
    pub element_type_id: i32,
    pub project_id: i32,
    pub version: String,
    pub file: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
