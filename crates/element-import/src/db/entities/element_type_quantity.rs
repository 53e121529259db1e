//! Tower/floor quantity ledger for hierarchy positions that have a parent.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "element_type_quantity")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub element_type_id: i32,
    pub project_id: i32,
    pub tower_id: i32,
    pub floor_id: i32,
    pub total_quantity: i32,
    pub left_quantity: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
