//! Migration to create the cache_entries table.
//!
//! Opaque key-value store with expiry, backing the shared provider token cache.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CacheEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CacheEntries::Key)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CacheEntries::Value).text().not_null())
                    .col(
                        ColumnDef::new(CacheEntries::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CacheEntries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CacheEntries {
    Table,
    Key,
    Value,
    ExpiresAt,
}
