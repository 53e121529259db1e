use sea_orm::entity::prelude::*;

/// Produced element held in stock.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "precast_stock")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,
    pub element_type_id: i32,
    pub element_id: Option<String>,
    /// True once the element has reached the stockyard.
    pub stockyard: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
