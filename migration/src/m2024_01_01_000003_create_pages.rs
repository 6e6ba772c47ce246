//! Migration to create the pages table.
//!
//! Pages form a per-tenant tree through the nullable `parent_id`
//! self-reference; `(tenant_id, slug)` is unique.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Pages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Pages::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Pages::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Pages::Slug).text().not_null())
                    .col(ColumnDef::new(Pages::Title).text().not_null())
                    .col(ColumnDef::new(Pages::Description).text().null())
                    .col(ColumnDef::new(Pages::Content).json_binary().not_null())
                    .col(ColumnDef::new(Pages::Seo).json_binary().not_null())
                    .col(
                        ColumnDef::new(Pages::Status)
                            .text()
                            .not_null()
                            .default("DRAFT"),
                    )
                    .col(
                        ColumnDef::new(Pages::Template)
                            .text()
                            .not_null()
                            .default("default"),
                    )
                    .col(
                        ColumnDef::new(Pages::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Pages::ParentId).uuid().null())
                    .col(ColumnDef::new(Pages::AuthorId).uuid().null())
                    .col(
                        ColumnDef::new(Pages::PublishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Pages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Pages::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pages_tenant_id")
                            .from(Pages::Table, Pages::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pages_parent_id")
                            .from(Pages::Table, Pages::ParentId)
                            .to(Pages::Table, Pages::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pages_author_id")
                            .from(Pages::Table, Pages::AuthorId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pages_tenant_slug_unique")
                    .table(Pages::Table)
                    .col(Pages::TenantId)
                    .col(Pages::Slug)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Menu and listing queries filter by tenant, status and parent
        manager
            .create_index(
                Index::create()
                    .name("idx_pages_tenant_status_parent")
                    .table(Pages::Table)
                    .col(Pages::TenantId)
                    .col(Pages::Status)
                    .col(Pages::ParentId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Pages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Pages {
    Table,
    Id,
    TenantId,
    Slug,
    Title,
    Description,
    Content,
    Seo,
    Status,
    Template,
    SortOrder,
    ParentId,
    AuthorId,
    PublishedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
