//! Rollback of everything an import job created.
//!
//! A rollback runs in one transaction: the `rollback_enabled` flag is
//! claimed first, then the downstream gates are checked, then dependents are
//! deleted child-first. A denied gate or any error reverts the claim.

use std::fmt;

use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, PaginatorTrait,
    QueryFilter, QuerySelect, TransactionTrait,
};
use serde::Serialize;
use thiserror::Error;
use tracing::Instrument;

use crate::db::entities::{
    activity, drawing, drawing_revision, element, element_type, element_type_bom,
    element_type_path, element_type_quantity, element_type_revision, hierarchy_quantity,
    precast_stock, Activity, Drawing, DrawingRevision, Element, ElementType, ElementTypeBom,
    ElementTypePath, ElementTypeQuantity, ElementTypeRevision, HierarchyQuantity, PrecastStock,
};
use crate::db::{job_repo, DatabaseError};

/// Ids per `IN (...)` list.
const ID_CHUNK: usize = 500;

/// Downstream state that blocks a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Production,
    Activity,
    Stockyard,
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GateKind::Production => "production",
            GateKind::Activity => "activity",
            GateKind::Stockyard => "stockyard",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackDenial {
    pub job_id: i32,
    pub gate: GateKind,
    pub count: u64,
    pub message: String,
}

impl RollbackDenial {
    fn new(job_id: i32, gate: GateKind, count: u64) -> Self {
        let message = match gate {
            GateKind::Production => {
                format!("{} element(s) of this import are already in production", count)
            }
            GateKind::Activity => {
                format!("{} activit(ies) on this import's element types are in progress", count)
            }
            GateKind::Stockyard => {
                format!("{} element(s) of this import have reached the stockyard", count)
            }
        };
        Self {
            job_id,
            gate,
            count,
            message,
        }
    }
}

#[derive(Error, Debug)]
pub enum RollbackError {
    #[error("Import job {0} not found")]
    JobNotFound(i32),

    #[error("Rollback is not enabled for import job {job_id} or was already performed")]
    Disabled { job_id: i32 },

    #[error("A rollback of import job {job_id} is already in progress")]
    InProgress { job_id: i32 },

    #[error("Rollback of import job {} denied by {} gate: {}", .0.job_id, .0.gate, .0.message)]
    Denied(RollbackDenial),

    #[error("Database error during rollback: {0}")]
    Database(#[from] DatabaseError),
}

impl From<sea_orm::DbErr> for RollbackError {
    fn from(err: sea_orm::DbErr) -> Self {
        RollbackError::Database(DatabaseError::from(err))
    }
}

/// Rows deleted per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    pub job_id: i32,
    pub drawings_revision: u64,
    pub drawings: u64,
    pub hierarchy_quantities: u64,
    pub element_type_quantities: u64,
    pub stage_paths: u64,
    pub bom_lines: u64,
    pub element_type_revisions: u64,
    pub elements: u64,
    pub element_types: u64,
}

impl RollbackReport {
    pub fn total(&self) -> u64 {
        self.drawings_revision
            + self.drawings
            + self.hierarchy_quantities
            + self.element_type_quantities
            + self.stage_paths
            + self.bom_lines
            + self.element_type_revisions
            + self.elements
            + self.element_types
    }
}

#[derive(Clone)]
pub struct RollbackEngine {
    db: DatabaseConnection,
}

impl RollbackEngine {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Deletes everything job `job_id` created, provided rollback is enabled
    /// and no gate objects.
    pub async fn rollback(&self, job_id: i32) -> Result<RollbackReport, RollbackError> {
        let span = tracing::info_span!("rollback", job_id);
        async {
            let txn = self.db.begin().await?;
            match rollback_in(&txn, job_id).await {
                Ok(report) => {
                    txn.commit().await?;
                    tracing::info!(
                        job_id,
                        element_types = report.element_types,
                        elements = report.elements,
                        total = report.total(),
                        "Rollback committed"
                    );
                    Ok(report)
                }
                Err(e) => {
                    txn.rollback().await?;
                    match &e {
                        RollbackError::Denied(denial) => {
                            tracing::warn!(job_id, gate = %denial.gate, count = denial.count, "Rollback denied")
                        }
                        other => tracing::warn!(job_id, error = %other, "Rollback aborted"),
                    }
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

async fn rollback_in(
    txn: &DatabaseTransaction,
    job_id: i32,
) -> Result<RollbackReport, RollbackError> {
    let job = job_repo::find_by_id(txn, job_id)
        .await?
        .ok_or(RollbackError::JobNotFound(job_id))?;
    if !job_repo::claim_rollback(txn, job_id).await? {
        return Err(RollbackError::Disabled { job_id });
    }

    let ids = element_type_ids(txn, job_id, job.project_id).await?;
    if let Some(denial) = check_gates(txn, job_id, &ids).await? {
        return Err(RollbackError::Denied(denial));
    }

    let mut report = RollbackReport {
        job_id,
        ..Default::default()
    };
    report.drawings_revision =
        delete_in::<DrawingRevision>(txn, drawing_revision::Column::ElementTypeId, &ids).await?;
    report.drawings = delete_in::<Drawing>(txn, drawing::Column::ElementTypeId, &ids).await?;
    report.hierarchy_quantities =
        delete_in::<HierarchyQuantity>(txn, hierarchy_quantity::Column::ElementTypeId, &ids)
            .await?;
    report.element_type_quantities =
        delete_in::<ElementTypeQuantity>(txn, element_type_quantity::Column::ElementTypeId, &ids)
            .await?;
    report.stage_paths =
        delete_in::<ElementTypePath>(txn, element_type_path::Column::ElementTypeId, &ids).await?;
    report.bom_lines =
        delete_in::<ElementTypeBom>(txn, element_type_bom::Column::ElementTypeId, &ids).await?;
    report.element_type_revisions =
        delete_in::<ElementTypeRevision>(txn, element_type_revision::Column::ElementTypeId, &ids)
            .await?;
    report.elements = delete_in::<Element>(txn, element::Column::ElementTypeId, &ids).await?;
    report.element_types = ElementType::delete_many()
        .filter(element_type::Column::JobId.eq(job_id))
        .filter(element_type::Column::ProjectId.eq(job.project_id))
        .exec(txn)
        .await?
        .rows_affected;

    Ok(report)
}

/// Element types created by the job within its project.
async fn element_type_ids(
    txn: &DatabaseTransaction,
    job_id: i32,
    project_id: i32,
) -> Result<Vec<i32>, RollbackError> {
    Ok(ElementType::find()
        .select_only()
        .column(element_type::Column::ElementTypeId)
        .filter(element_type::Column::JobId.eq(job_id))
        .filter(element_type::Column::ProjectId.eq(project_id))
        .into_tuple::<i32>()
        .all(txn)
        .await?)
}

/// Returns the first gate that objects, checked in production, activity,
/// stockyard order.
pub async fn check_gates<C: sea_orm::ConnectionTrait>(
    conn: &C,
    job_id: i32,
    element_type_ids: &[i32],
) -> Result<Option<RollbackDenial>, RollbackError> {
    let mut in_production = 0;
    let mut active = 0;
    let mut stocked = 0;

    for chunk in element_type_ids.chunks(ID_CHUNK) {
        in_production += Element::find()
            .filter(element::Column::ElementTypeId.is_in(chunk.iter().copied()))
            .filter(element::Column::Instage.eq(true))
            .count(conn)
            .await?;
        active += Activity::find()
            .filter(activity::Column::ElementTypeId.is_in(chunk.iter().copied()))
            .filter(activity::Column::Status.is_in(activity::ACTIVE_STATUSES))
            .count(conn)
            .await?;
        stocked += PrecastStock::find()
            .filter(precast_stock::Column::ElementTypeId.is_in(chunk.iter().copied()))
            .filter(precast_stock::Column::Stockyard.eq(true))
            .count(conn)
            .await?;
    }

    let denial = [
        (GateKind::Production, in_production),
        (GateKind::Activity, active),
        (GateKind::Stockyard, stocked),
    ]
    .into_iter()
    .find(|(_, count)| *count > 0)
    .map(|(gate, count)| RollbackDenial::new(job_id, gate, count));

    Ok(denial)
}

async fn delete_in<E: EntityTrait>(
    txn: &DatabaseTransaction,
    column: E::Column,
    ids: &[i32],
) -> Result<u64, RollbackError> {
    let mut deleted = 0;
    for chunk in ids.chunks(ID_CHUNK) {
        deleted += E::delete_many()
            .filter(column.is_in(chunk.iter().copied()))
            .exec(txn)
            .await?
            .rows_affected;
    }
    Ok(deleted)
}
