use sea_orm::entity::prelude::*;

/// Ordered production stages of an element type.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "element_type_path")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub element_type_id: i32,
    /// JSON array of `project_stages.id`.
    #[sea_orm(column_type = "Json")]
    pub stage_path: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Decodes the stored stage ids, ignoring malformed entries.
    pub fn stage_ids(&self) -> Vec<i32> {
        match &self.stage_path {
            Json::Array(items) => items
                .iter()
                .filter_map(|v| v.as_i64())
                .filter_map(|v| i32::try_from(v).ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}
