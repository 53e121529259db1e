use sea_orm::entity::prelude::*;

/// Project-scoped drawing category, referenced by name from the workbook headers.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "drawing_type")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub drawing_type_id: i32,
    pub project_id: i32,
    pub drawing_type_name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
