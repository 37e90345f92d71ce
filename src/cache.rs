//! Key/value cache with per-entry TTL used for provider auth tokens.
//!
//! Two backends are available: a process-local LRU and the `cache_entries`
//! table. Writers race benignly; the last write wins.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait, sea_query::OnConflict};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::TokenCacheBackend;
use crate::models::cache_entry;

const MEMORY_CACHE_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("ttl out of range: {0:?}")]
    InvalidTtl(Duration),
}

/// A live cache value together with the instant it stops being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedValue {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// Get/put-with-TTL storage for short strings.
#[async_trait]
pub trait TokenCache: Send + Sync {
    /// Returns the value if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<CachedValue>, CacheError>;

    /// Stores `value` under `key` for `ttl`, replacing any previous value.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Drops `key` if present.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// Builds the cache selected by configuration.
pub fn build_token_cache(
    backend: TokenCacheBackend,
    db: &DatabaseConnection,
) -> Arc<dyn TokenCache> {
    match backend {
        TokenCacheBackend::Memory => Arc::new(MemoryTokenCache::new()),
        TokenCacheBackend::Database => Arc::new(DatabaseTokenCache::new(db.clone())),
    }
}

fn expiry_after(ttl: Duration) -> Result<DateTime<Utc>, CacheError> {
    let delta = chrono::Duration::from_std(ttl).map_err(|_| CacheError::InvalidTtl(ttl))?;
    Utc::now()
        .checked_add_signed(delta)
        .ok_or(CacheError::InvalidTtl(ttl))
}

/// In-process LRU cache.
pub struct MemoryTokenCache {
    entries: Mutex<LruCache<String, CachedValue>>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::with_capacity(NonZeroUsize::new(MEMORY_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl Default for MemoryTokenCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn get(&self, key: &str) -> Result<Option<CachedValue>, CacheError> {
        let mut entries = self.entries.lock().await;
        let hit = entries.get(key).cloned();
        match hit {
            Some(entry) if entry.expires_at > Utc::now() => Ok(Some(entry)),
            Some(_) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let entry = CachedValue {
            value: value.to_string(),
            expires_at: expiry_after(ttl)?,
        };
        self.entries.lock().await.put(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.pop(key);
        Ok(())
    }
}

/// Cache stored in the `cache_entries` table, shared across processes.
pub struct DatabaseTokenCache {
    db: DatabaseConnection,
}

impl DatabaseTokenCache {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenCache for DatabaseTokenCache {
    async fn get(&self, key: &str) -> Result<Option<CachedValue>, CacheError> {
        let entry = cache_entry::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await?;

        Ok(entry
            .map(|entry| CachedValue {
                value: entry.value,
                expires_at: entry.expires_at.with_timezone(&Utc),
            })
            .filter(|entry| entry.expires_at > Utc::now()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let entry = cache_entry::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            expires_at: Set(expiry_after(ttl)?.fixed_offset()),
        };

        cache_entry::Entity::insert(entry)
            .on_conflict(
                OnConflict::column(cache_entry::Column::Key)
                    .update_columns([cache_entry::Column::Value, cache_entry::Column::ExpiresAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        cache_entry::Entity::delete_by_id(key.to_string())
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    async fn migrated_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_memory_cache_round_trip_and_expiry() {
        let cache = MemoryTokenCache::new();

        cache
            .put("tvdb_auth_token", "abc", Duration::from_secs(60))
            .await
            .unwrap();
        let hit = cache.get("tvdb_auth_token").await.unwrap().unwrap();
        assert_eq!(hit.value, "abc");
        assert!(hit.expires_at > Utc::now());

        cache
            .put("tvdb_auth_token", "stale", Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(cache.get("tvdb_auth_token").await.unwrap(), None);
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_cache_evicts_least_recent() {
        let cache = MemoryTokenCache::with_capacity(NonZeroUsize::MIN);
        cache.put("a", "1", Duration::from_secs(60)).await.unwrap();
        cache.put("b", "2", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap().unwrap().value, "2");
    }

    #[tokio::test]
    async fn test_memory_cache_remove() {
        let cache = MemoryTokenCache::new();
        cache.put("a", "1", Duration::from_secs(60)).await.unwrap();
        cache.remove("a").await.unwrap();
        cache.remove("never-set").await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_database_cache_upsert_last_writer_wins() {
        let cache = DatabaseTokenCache::new(migrated_db().await);

        cache.put("k", "first", Duration::from_secs(60)).await.unwrap();
        cache.put("k", "second", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap().unwrap().value, "second");
    }

    #[tokio::test]
    async fn test_database_cache_expired_entry_and_remove() {
        let cache = DatabaseTokenCache::new(migrated_db().await);

        cache.put("old", "value", Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("old").await.unwrap(), None);

        cache.put("live", "value", Duration::from_secs(60)).await.unwrap();
        cache.remove("live").await.unwrap();
        assert_eq!(cache.get("live").await.unwrap(), None);
    }
}
