//! Element type entity: the template row each imported spreadsheet line becomes.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "element_type")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub element_type_id: i32,
    pub project_id: i32,
    /// Import job that created this row. `None` for manually created types.
    pub job_id: Option<i32>,
    pub element_type: String,
    pub element_type_name: String,
    pub thickness: f64,
    pub length: f64,
    pub height: f64,
    pub width: f64,
    pub volume: f64,
    pub area: f64,
    pub mass: f64,
    /// `mass / volume` when volume is positive, otherwise 0.
    pub density: f64,
    pub version: String,
    pub total_count_element: i32,
    pub created_by: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
