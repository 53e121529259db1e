//! Element types and every table keyed by `element_type_id`.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ElementType::Table)
                    .if_not_exists()
                    .col(pk_auto(ElementType::ElementTypeId))
                    .col(integer(ElementType::ProjectId).not_null())
                    .col(integer_null(ElementType::JobId))
                    .col(string(ElementType::ElementType).not_null())
                    .col(string(ElementType::ElementTypeName).not_null())
                    .col(double(ElementType::Thickness).not_null().default(0.0))
                    .col(double(ElementType::Length).not_null().default(0.0))
                    .col(double(ElementType::Height).not_null().default(0.0))
                    .col(double(ElementType::Width).not_null().default(0.0))
                    .col(double(ElementType::Volume).not_null().default(0.0))
                    .col(double(ElementType::Area).not_null().default(0.0))
                    .col(double(ElementType::Mass).not_null().default(0.0))
                    .col(double(ElementType::Density).not_null().default(0.0))
                    .col(string(ElementType::Version).not_null())
                    .col(integer(ElementType::TotalCountElement).not_null().default(0))
                    .col(string(ElementType::CreatedBy).not_null())
                    .col(timestamp_with_time_zone(ElementType::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(ElementType::UpdatedAt).not_null())
                    .to_owned(),
            )
            .await?;

        // Rollback selects element types by job and project
        manager
            .create_index(
                Index::create()
                    .name("idx_element_type_job_project")
                    .table(ElementType::Table)
                    .col(ElementType::JobId)
                    .col(ElementType::ProjectId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Drawings::Table)
                    .if_not_exists()
                    .col(string(Drawings::DrawingsId).primary_key())
                    .col(integer(Drawings::ProjectId).not_null())
                    .col(integer(Drawings::ElementTypeId).not_null())
                    .col(integer(Drawings::DrawingTypeId).not_null())
                    .col(text(Drawings::File).not_null())
                    .col(string(Drawings::Version).not_null())
                    .col(string(Drawings::CreatedBy).not_null())
                    .col(timestamp_with_time_zone(Drawings::CreatedAt).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DrawingsRevision::Table)
                    .if_not_exists()
                    .col(pk_auto(DrawingsRevision::Id))
                    .col(string(DrawingsRevision::DrawingsId).not_null())
                    .col(integer(DrawingsRevision::ElementTypeId).not_null())
                    .col(integer(DrawingsRevision::ProjectId).not_null())
                    .col(string(DrawingsRevision::Version).not_null())
                    .col(text(DrawingsRevision::File).not_null())
                    .col(timestamp_with_time_zone(DrawingsRevision::CreatedAt).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ElementTypeHierarchyQuantity::Table)
                    .if_not_exists()
                    .col(pk_auto(ElementTypeHierarchyQuantity::Id))
                    .col(integer(ElementTypeHierarchyQuantity::ElementTypeId).not_null())
                    .col(integer(ElementTypeHierarchyQuantity::HierarchyId).not_null())
                    .col(integer(ElementTypeHierarchyQuantity::ProjectId).not_null())
                    .col(integer(ElementTypeHierarchyQuantity::Quantity).not_null())
                    .col(string(ElementTypeHierarchyQuantity::NamingConvention).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ElementTypeQuantity::Table)
                    .if_not_exists()
                    .col(pk_auto(ElementTypeQuantity::Id))
                    .col(integer(ElementTypeQuantity::ElementTypeId).not_null())
                    .col(integer(ElementTypeQuantity::ProjectId).not_null())
                    .col(integer(ElementTypeQuantity::TowerId).not_null())
                    .col(integer(ElementTypeQuantity::FloorId).not_null())
                    .col(integer(ElementTypeQuantity::TotalQuantity).not_null())
                    .col(integer(ElementTypeQuantity::LeftQuantity).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ElementTypePath::Table)
                    .if_not_exists()
                    .col(pk_auto(ElementTypePath::Id))
                    .col(integer(ElementTypePath::ElementTypeId).not_null())
                    .col(json(ElementTypePath::StagePath).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ElementTypeBom::Table)
                    .if_not_exists()
                    .col(pk_auto(ElementTypeBom::Id))
                    .col(integer(ElementTypeBom::ElementTypeId).not_null())
                    .col(integer(ElementTypeBom::ProjectId).not_null())
                    .col(integer(ElementTypeBom::ProductId).not_null())
                    .col(string(ElementTypeBom::ProductName).not_null())
                    .col(double(ElementTypeBom::Quantity).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ElementTypeRevision::Table)
                    .if_not_exists()
                    .col(pk_auto(ElementTypeRevision::Id))
                    .col(integer(ElementTypeRevision::ElementTypeId).not_null())
                    .col(string(ElementTypeRevision::Revision).not_null())
                    .col(timestamp_with_time_zone(ElementTypeRevision::CreatedAt).not_null())
                    .to_owned(),
            )
            .await?;

        for (name, table, column) in [
            (
                "idx_drawings_element_type",
                Drawings::Table.into_iden(),
                Drawings::ElementTypeId.into_iden(),
            ),
            (
                "idx_drawings_revision_element_type",
                DrawingsRevision::Table.into_iden(),
                DrawingsRevision::ElementTypeId.into_iden(),
            ),
            (
                "idx_hierarchy_quantity_element_type",
                ElementTypeHierarchyQuantity::Table.into_iden(),
                ElementTypeHierarchyQuantity::ElementTypeId.into_iden(),
            ),
            (
                "idx_element_type_quantity_element_type",
                ElementTypeQuantity::Table.into_iden(),
                ElementTypeQuantity::ElementTypeId.into_iden(),
            ),
            (
                "idx_element_type_path_element_type",
                ElementTypePath::Table.into_iden(),
                ElementTypePath::ElementTypeId.into_iden(),
            ),
            (
                "idx_element_type_bom_element_type",
                ElementTypeBom::Table.into_iden(),
                ElementTypeBom::ElementTypeId.into_iden(),
            ),
            (
                "idx_element_type_revision_element_type",
                ElementTypeRevision::Table.into_iden(),
                ElementTypeRevision::ElementTypeId.into_iden(),
            ),
        ] {
            manager
                .create_index(
                    Index::create()
                        .name(name)
                        .table(table)
                        .col(column)
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            ElementTypeRevision::Table.into_iden(),
            ElementTypeBom::Table.into_iden(),
            ElementTypePath::Table.into_iden(),
            ElementTypeQuantity::Table.into_iden(),
            ElementTypeHierarchyQuantity::Table.into_iden(),
            DrawingsRevision::Table.into_iden(),
            Drawings::Table.into_iden(),
            ElementType::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum ElementType {
    Table,
    ElementTypeId,
    ProjectId,
    JobId,
    ElementType,
    ElementTypeName,
    Thickness,
    Length,
    Height,
    Width,
    Volume,
    Area,
    Mass,
    Density,
    Version,
    TotalCountElement,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Drawings {
    Table,
    DrawingsId,
    ProjectId,
    ElementTypeId,
    DrawingTypeId,
    File,
    Version,
    CreatedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum DrawingsRevision {
    Table,
    Id,
    DrawingsId,
    ElementTypeId,
    ProjectId,
    Version,
    File,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ElementTypeHierarchyQuantity {
    Table,
    Id,
    ElementTypeId,
    HierarchyId,
    ProjectId,
    Quantity,
    NamingConvention,
}

#[derive(DeriveIden)]
enum ElementTypeQuantity {
    Table,
    Id,
    ElementTypeId,
    ProjectId,
    TowerId,
    FloorId,
    TotalQuantity,
    LeftQuantity,
}

#[derive(DeriveIden)]
enum ElementTypePath {
    Table,
    Id,
    ElementTypeId,
    StagePath,
}

#[derive(DeriveIden)]
enum ElementTypeBom {
    Table,
    Id,
    ElementTypeId,
    ProjectId,
    ProductId,
    ProductName,
    Quantity,
}

#[derive(DeriveIden)]
enum ElementTypeRevision {
    Table,
    Id,
    ElementTypeId,
    Revision,
    CreatedAt,
}
