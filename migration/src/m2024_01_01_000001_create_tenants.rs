//! Migration to create the tenants table.
//!
//! Tenants are the isolation root of the CMS: every page, user and deployment
//! hangs off one of these rows.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tenants::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tenants::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Tenants::Name).text().not_null())
                    .col(ColumnDef::new(Tenants::Slug).text().not_null())
                    .col(ColumnDef::new(Tenants::Domain).text().not_null())
                    .col(ColumnDef::new(Tenants::Domains).json_binary().not_null())
                    .col(ColumnDef::new(Tenants::ApiKey).text().not_null())
                    .col(ColumnDef::new(Tenants::Settings).json_binary().not_null())
                    .col(
                        ColumnDef::new(Tenants::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Tenants::BuildRepository).text().null())
                    .col(
                        ColumnDef::new(Tenants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Tenants::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        for (name, column) in [
            ("idx_tenants_slug_unique", Tenants::Slug),
            ("idx_tenants_domain_unique", Tenants::Domain),
            ("idx_tenants_api_key_unique", Tenants::ApiKey),
        ] {
            manager
                .create_index(
                    Index::create()
                        .name(name)
                        .table(Tenants::Table)
                        .col(column)
                        .unique()
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tenants::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
    Name,
    Slug,
    Domain,
    Domains,
    ApiKey,
    Settings,
    IsActive,
    BuildRepository,
    CreatedAt,
    UpdatedAt,
}
