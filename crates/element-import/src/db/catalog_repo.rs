//! Read-only access to the project reference tables.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};

use super::entities::{drawing_type, inv_bom, precast, project_stage};
use super::entities::{DrawingType, InvBom, Precast, ProjectStage};
use super::DatabaseError;

/// Reference rows of one project, as loaded before an import starts.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub drawing_types: Vec<drawing_type::Model>,
    pub stages: Vec<project_stage::Model>,
    pub boms: Vec<inv_bom::Model>,
    pub precast: Vec<precast::Model>,
}

pub async fn load_reference_data<C: ConnectionTrait>(
    conn: &C,
    project_id: i32,
) -> Result<ReferenceData, DatabaseError> {
    let drawing_types = DrawingType::find()
        .filter(drawing_type::Column::ProjectId.eq(project_id))
        .order_by_asc(drawing_type::Column::DrawingTypeId)
        .all(conn)
        .await?;
    let stages = ProjectStage::find()
        .filter(project_stage::Column::ProjectId.eq(project_id))
        .order_by_asc(project_stage::Column::Sequence)
        .order_by_asc(project_stage::Column::Id)
        .all(conn)
        .await?;
    let boms = InvBom::find()
        .filter(inv_bom::Column::ProjectId.eq(project_id))
        .order_by_asc(inv_bom::Column::Id)
        .all(conn)
        .await?;
    let precast = Precast::find()
        .filter(precast::Column::ProjectId.eq(project_id))
        .order_by_asc(precast::Column::Id)
        .all(conn)
        .await?;

    log::debug!(
        "Loaded reference data for project {}: {} drawing types, {} stages, {} boms, {} precast nodes",
        project_id,
        drawing_types.len(),
        stages.len(),
        boms.len(),
        precast.len()
    );

    Ok(ReferenceData {
        drawing_types,
        stages,
        boms,
        precast,
    })
}

/// Looks a precast node up by id within a project.
pub async fn find_precast<C: ConnectionTrait>(
    conn: &C,
    project_id: i32,
    id: i32,
) -> Result<Option<precast::Model>, DatabaseError> {
    Ok(Precast::find_by_id(id)
        .filter(precast::Column::ProjectId.eq(project_id))
        .one(conn)
        .await?)
}

/// Looks a precast node up by its stored path within a project.
pub async fn find_precast_by_path<C: ConnectionTrait>(
    conn: &C,
    project_id: i32,
    path: &str,
) -> Result<Option<precast::Model>, DatabaseError> {
    Ok(Precast::find()
        .filter(precast::Column::ProjectId.eq(project_id))
        .filter(precast::Column::Path.eq(path))
        .one(conn)
        .await?)
}
