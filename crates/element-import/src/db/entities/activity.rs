//! Production task scheduled against an element type.

use sea_orm::entity::prelude::*;

/// Activity statuses that block a rollback.
pub const ACTIVE_STATUSES: [&str; 3] = ["in_progress", "started", "active"];

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "activity")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,
    pub element_type_id: i32,
    pub element_id: Option<String>,
    pub name: String,
    pub status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
