//! Initial migration to create the import_jobs table.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ImportJobs::Table)
                    .if_not_exists()
                    .col(pk_auto(ImportJobs::Id))
                    .col(integer(ImportJobs::ProjectId).not_null())
                    .col(string(ImportJobs::JobType).not_null())
                    .col(string_len(ImportJobs::Status, 32).not_null().default("pending"))
                    .col(integer(ImportJobs::Progress).not_null().default(0))
                    .col(integer(ImportJobs::TotalItems).not_null().default(0))
                    .col(integer(ImportJobs::ProcessedItems).not_null().default(0))
                    .col(text(ImportJobs::FilePath).not_null())
                    .col(boolean(ImportJobs::RollbackEnabled).not_null().default(false))
                    .col(text_null(ImportJobs::Error))
                    .col(string_null(ImportJobs::CreatedBy))
                    .col(timestamp_with_time_zone(ImportJobs::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(ImportJobs::UpdatedAt).not_null())
                    .col(timestamp_with_time_zone_null(ImportJobs::StartedAt))
                    .col(timestamp_with_time_zone_null(ImportJobs::CompletedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_import_jobs_status")
                    .table(ImportJobs::Table)
                    .col(ImportJobs::Status)
                    .to_owned(),
            )
            .await?;

        // Pending-job lookup: filter by project and status, order by created_at
        manager
            .create_index(
                Index::create()
                    .name("idx_import_jobs_project_status_created_at")
                    .table(ImportJobs::Table)
                    .col(ImportJobs::ProjectId)
                    .col(ImportJobs::Status)
                    .col(ImportJobs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ImportJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ImportJobs {
    Table,
    Id,
    ProjectId,
    JobType,
    Status,
    Progress,
    TotalItems,
    ProcessedItems,
    FilePath,
    RollbackEnabled,
    Error,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
    StartedAt,
    CompletedAt,
}
