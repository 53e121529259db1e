//! Project reference data read by the importer: hierarchy nodes, drawing
//! types, production stages and inventory products.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Precast::Table)
                    .if_not_exists()
                    .col(pk_auto(Precast::Id))
                    .col(integer(Precast::ProjectId).not_null())
                    .col(text(Precast::Path).not_null())
                    .col(string(Precast::NamingConvention).not_null())
                    .col(integer_null(Precast::ParentId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_precast_project_path")
                    .table(Precast::Table)
                    .col(Precast::ProjectId)
                    .col(Precast::Path)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DrawingType::Table)
                    .if_not_exists()
                    .col(pk_auto(DrawingType::DrawingTypeId))
                    .col(integer(DrawingType::ProjectId).not_null())
                    .col(string(DrawingType::DrawingTypeName).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProjectStages::Table)
                    .if_not_exists()
                    .col(pk_auto(ProjectStages::Id))
                    .col(integer(ProjectStages::ProjectId).not_null())
                    .col(string(ProjectStages::Name).not_null())
                    .col(integer(ProjectStages::Sequence).not_null().default(0))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(InvBom::Table)
                    .if_not_exists()
                    .col(pk_auto(InvBom::Id))
                    .col(integer(InvBom::ProjectId).not_null())
                    .col(string(InvBom::ProductName).not_null())
                    .col(string_null(InvBom::Unit))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InvBom::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProjectStages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DrawingType::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Precast::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Precast {
    Table,
    Id,
    ProjectId,
    Path,
    NamingConvention,
    ParentId,
}

#[derive(DeriveIden)]
enum DrawingType {
    Table,
    DrawingTypeId,
    ProjectId,
    DrawingTypeName,
}

#[derive(DeriveIden)]
enum ProjectStages {
    Table,
    Id,
    ProjectId,
    Name,
    Sequence,
}

#[derive(DeriveIden)]
enum InvBom {
    Table,
    Id,
    ProjectId,
    ProductName,
    Unit,
}
