//! Job repository: queries and guarded status writes for `import_jobs`.
//!
//! Every status write except [`force_cancelled`] is conditional on the row
//! still being in flight, so a cancelled or terminated job can never be moved
//! to another status by a late writer.

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use super::entities::import_job::{self, Column, Entity as ImportJob, JobStatus};
use super::DatabaseError;

/// Message written to the error column of a job cancelled by the control plane.
pub const CANCELLED_BY_USER: &str = "Import cancelled by user";

/// Fields supplied when a job row is created.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub project_id: i32,
    pub file_path: String,
    pub created_by: Option<String>,
    pub rollback_enabled: bool,
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub project_id: Option<i32>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a `pending` job row.
pub async fn create<C: ConnectionTrait>(
    conn: &C,
    job: NewJob,
) -> Result<import_job::Model, DatabaseError> {
    let now = Utc::now();
    let model = import_job::ActiveModel {
        project_id: Set(job.project_id),
        job_type: Set(import_job::ELEMENT_TYPE_IMPORT.to_string()),
        status: Set(JobStatus::Pending),
        progress: Set(0),
        total_items: Set(0),
        processed_items: Set(0),
        file_path: Set(job.file_path),
        rollback_enabled: Set(job.rollback_enabled),
        error: Set(None),
        created_by: Set(job.created_by),
        created_at: Set(now),
        updated_at: Set(now),
        started_at: Set(None),
        completed_at: Set(None),
        ..Default::default()
    };
    Ok(model.insert(conn).await?)
}

pub async fn find_by_id<C: ConnectionTrait>(
    conn: &C,
    id: i32,
) -> Result<Option<import_job::Model>, DatabaseError> {
    Ok(ImportJob::find_by_id(id).one(conn).await?)
}

/// Reads only the persisted status; `None` when the row is gone.
pub async fn find_status<C: ConnectionTrait>(
    conn: &C,
    id: i32,
) -> Result<Option<JobStatus>, DatabaseError> {
    Ok(find_by_id(conn, id).await?.map(|job| job.status))
}

/// Most recent pending or processing job of a project created at or after
/// `since`.
pub async fn find_recent_active<C: ConnectionTrait>(
    conn: &C,
    project_id: i32,
    since: DateTime<Utc>,
) -> Result<Option<import_job::Model>, DatabaseError> {
    Ok(ImportJob::find()
        .filter(Column::ProjectId.eq(project_id))
        .filter(Column::Status.is_in(JobStatus::active()))
        .filter(Column::CreatedAt.gte(since))
        .order_by_desc(Column::CreatedAt)
        .order_by_desc(Column::Id)
        .one(conn)
        .await?)
}

/// Queries jobs with filters, returning (rows, total_count).
pub async fn query<C: ConnectionTrait>(
    conn: &C,
    filter: &JobFilter,
) -> Result<(Vec<import_job::Model>, u64), DatabaseError> {
    let mut select = ImportJob::find();
    if let Some(status) = filter.status {
        select = select.filter(Column::Status.eq(status));
    }
    if let Some(project_id) = filter.project_id {
        select = select.filter(Column::ProjectId.eq(project_id));
    }

    let total = select.clone().count(conn).await?;

    let rows = select
        .order_by_desc(Column::CreatedAt)
        .order_by_desc(Column::Id)
        .limit(filter.limit.unwrap_or(100))
        .offset(filter.offset.unwrap_or(0))
        .all(conn)
        .await?;

    Ok((rows, total))
}

pub async fn count_by_status<C: ConnectionTrait>(
    conn: &C,
    status: JobStatus,
) -> Result<u64, DatabaseError> {
    Ok(ImportJob::find()
        .filter(Column::Status.eq(status))
        .count(conn)
        .await?)
}

/// `pending -> processing`. Returns false when the job already left
/// `pending`.
pub async fn mark_processing<C: ConnectionTrait>(
    conn: &C,
    id: i32,
    total_items: i32,
) -> Result<bool, DatabaseError> {
    let now = Utc::now();
    let result = ImportJob::update_many()
        .col_expr(Column::Status, Expr::value(JobStatus::Processing.as_str()))
        .col_expr(Column::TotalItems, Expr::value(total_items))
        .col_expr(Column::StartedAt, Expr::value(now))
        .col_expr(Column::UpdatedAt, Expr::value(now))
        .filter(Column::Id.eq(id))
        .filter(Column::Status.eq(JobStatus::Pending))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Raises progress of a processing job. Never lowers it.
pub async fn update_progress<C: ConnectionTrait>(
    conn: &C,
    id: i32,
    progress: i32,
    processed_items: i32,
) -> Result<bool, DatabaseError> {
    let progress = progress.clamp(0, 100);
    let result = ImportJob::update_many()
        .col_expr(Column::Progress, Expr::value(progress))
        .col_expr(Column::ProcessedItems, Expr::value(processed_items))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::Id.eq(id))
        .filter(Column::Status.eq(JobStatus::Processing))
        .filter(Column::Progress.lte(progress))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Writes a terminal status for a job that is still in flight.
///
/// Non-cancellation statuses also set progress to 100.
pub async fn finish<C: ConnectionTrait>(
    conn: &C,
    id: i32,
    status: JobStatus,
    processed_items: i32,
    error: Option<String>,
) -> Result<bool, DatabaseError> {
    debug_assert!(status.is_terminal());
    let now = Utc::now();
    let mut update = ImportJob::update_many()
        .col_expr(Column::Status, Expr::value(status.as_str()))
        .col_expr(Column::ProcessedItems, Expr::value(processed_items))
        .col_expr(Column::Error, Expr::value(error))
        .col_expr(Column::CompletedAt, Expr::value(now))
        .col_expr(Column::UpdatedAt, Expr::value(now));
    if !status.is_cancellation() {
        update = update.col_expr(Column::Progress, Expr::value(100));
    }
    let result = update
        .filter(Column::Id.eq(id))
        .filter(Column::Status.is_in(JobStatus::active()))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Control-plane cancellation: `cancelled`, progress 0, completed now.
///
/// Unconditional. Returns the number of rows written (0 when the job does
/// not exist).
pub async fn force_cancelled<C: ConnectionTrait>(conn: &C, id: i32) -> Result<u64, DatabaseError> {
    let now = Utc::now();
    let result = ImportJob::update_many()
        .col_expr(Column::Status, Expr::value(JobStatus::Cancelled.as_str()))
        .col_expr(Column::Progress, Expr::value(0))
        .col_expr(Column::Error, Expr::value(CANCELLED_BY_USER))
        .col_expr(Column::CompletedAt, Expr::value(now))
        .col_expr(Column::UpdatedAt, Expr::value(now))
        .filter(Column::Id.eq(id))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Writes `cancelled` for a job still in flight. Used by the termination
/// monitor, which must not overwrite a status another writer already set.
pub async fn cancel_if_active<C: ConnectionTrait>(conn: &C, id: i32) -> Result<bool, DatabaseError> {
    let now = Utc::now();
    let result = ImportJob::update_many()
        .col_expr(Column::Status, Expr::value(JobStatus::Cancelled.as_str()))
        .col_expr(Column::Error, Expr::value(CANCELLED_BY_USER))
        .col_expr(Column::CompletedAt, Expr::value(now))
        .col_expr(Column::UpdatedAt, Expr::value(now))
        .filter(Column::Id.eq(id))
        .filter(Column::Status.is_in(JobStatus::active()))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

pub async fn set_rollback_enabled<C: ConnectionTrait>(
    conn: &C,
    id: i32,
    enabled: bool,
) -> Result<bool, DatabaseError> {
    let result = ImportJob::update_many()
        .col_expr(Column::RollbackEnabled, Expr::value(enabled))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::Id.eq(id))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Atomically flips `rollback_enabled` from true to false.
///
/// Exactly one caller wins; everyone else gets `false`.
pub async fn claim_rollback<C: ConnectionTrait>(conn: &C, id: i32) -> Result<bool, DatabaseError> {
    let result = ImportJob::update_many()
        .col_expr(Column::RollbackEnabled, Expr::value(false))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::Id.eq(id))
        .filter(Column::RollbackEnabled.eq(true))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Lower bound of the pending-job lookup window.
pub fn window_start(now: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    now - Duration::minutes(minutes)
}
