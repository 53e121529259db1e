//! Element instance entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Status given to freshly generated elements.
pub const STATUS_PLANNED: &str = "planned";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "element")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub element_type_id: i32,
    /// Generated from element type, naming convention and sequence number.
    pub element_id: String,
    /// Precast node the element is placed at.
    pub target_location: i32,
    pub project_id: i32,
    pub status: String,
    /// Set once production has started on the element.
    pub instage: bool,
    pub created_by: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
