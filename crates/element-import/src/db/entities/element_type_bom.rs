use sea_orm::entity::prelude::*;

/// Bill-of-materials line of an element type.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "element_type_bom")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub element_type_id: i32,
    pub project_id: i32,
    /// References `inv_bom.id`.
    pub product_id: i32,
    pub product_name: String,
    pub quantity: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
