//! Database migrations for the Emby webhooks service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_07_25_121736_create_emby_webhook_events;
mod m2025_07_26_090000_create_cache_entries;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_07_25_121736_create_emby_webhook_events::Migration),
            Box::new(m2025_07_26_090000_create_cache_entries::Migration),
        ]
    }
}
