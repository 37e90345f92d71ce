//! Migration to create the emby_webhook_events table.
//!
//! Each row is one inbound media-server notification, stored append-only with its
//! normalized metadata and the verbatim payload.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmbyWebhookEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmbyWebhookEvents::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EmbyWebhookEvents::PublicId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(EmbyWebhookEvents::EventType).text().not_null())
                    .col(ColumnDef::new(EmbyWebhookEvents::ItemType).text().null())
                    .col(ColumnDef::new(EmbyWebhookEvents::ItemName).text().null())
                    .col(ColumnDef::new(EmbyWebhookEvents::ItemPath).text().null())
                    .col(ColumnDef::new(EmbyWebhookEvents::UserName).text().null())
                    .col(ColumnDef::new(EmbyWebhookEvents::ServerName).text().null())
                    .col(
                        ColumnDef::new(EmbyWebhookEvents::Metadata)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmbyWebhookEvents::RawPayload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmbyWebhookEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Dashboard listing reads newest first
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_emby_webhook_events_created ON emby_webhook_events (created_at DESC, id DESC)".to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_emby_webhook_events_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(EmbyWebhookEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EmbyWebhookEvents {
    Table,
    Id,
    PublicId,
    EventType,
    ItemType,
    ItemName,
    ItemPath,
    UserName,
    ServerName,
    Metadata,
    RawPayload,
    CreatedAt,
}
