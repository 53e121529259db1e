//! Element instances plus the production tables consulted by rollback gates.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Element::Table)
                    .if_not_exists()
                    .col(pk_auto(Element::Id))
                    .col(integer(Element::ElementTypeId).not_null())
                    .col(string(Element::ElementId).not_null())
                    .col(integer(Element::TargetLocation).not_null())
                    .col(integer(Element::ProjectId).not_null())
                    .col(string(Element::Status).not_null())
                    .col(boolean(Element::Instage).not_null().default(false))
                    .col(string(Element::CreatedBy).not_null())
                    .col(timestamp_with_time_zone(Element::CreatedAt).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_element_element_type")
                    .table(Element::Table)
                    .col(Element::ElementTypeId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Activity::Table)
                    .if_not_exists()
                    .col(pk_auto(Activity::Id))
                    .col(integer(Activity::ProjectId).not_null())
                    .col(integer(Activity::ElementTypeId).not_null())
                    .col(string_null(Activity::ElementId))
                    .col(string(Activity::Name).not_null())
                    .col(string(Activity::Status).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PrecastStock::Table)
                    .if_not_exists()
                    .col(pk_auto(PrecastStock::Id))
                    .col(integer(PrecastStock::ProjectId).not_null())
                    .col(integer(PrecastStock::ElementTypeId).not_null())
                    .col(string_null(PrecastStock::ElementId))
                    .col(boolean(PrecastStock::Stockyard).not_null().default(false))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PrecastStock::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Activity::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Element::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Element {
    Table,
    Id,
    ElementTypeId,
    ElementId,
    TargetLocation,
    ProjectId,
    Status,
    Instage,
    CreatedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Activity {
    Table,
    Id,
    ProjectId,
    ElementTypeId,
    ElementId,
    Name,
    Status,
}

#[derive(DeriveIden)]
enum PrecastStock {
    Table,
    Id,
    ProjectId,
    ElementTypeId,
    ElementId,
    Stockyard,
}
