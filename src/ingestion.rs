//! Webhook ingestion pipeline: normalize, enrich with artwork, persist.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde_json::Value;
use tracing::info;

use crate::artwork::ArtworkResolver;
use crate::error::IngestError;
use crate::models::webhook_event::{MEDIA_ADDED_EVENTS, Model};
use crate::normalization::NormalizedEvent;
use crate::repositories::{NewWebhookEvent, WebhookEventRepository};

/// Turns raw payloads into stored, artwork-enriched events.
#[derive(Clone)]
pub struct WebhookIngestor {
    db: DatabaseConnection,
    resolver: Arc<ArtworkResolver>,
}

impl WebhookIngestor {
    pub fn new(db: DatabaseConnection, resolver: Arc<ArtworkResolver>) -> Self {
        Self { db, resolver }
    }

    /// Processes one payload end to end. Artwork lookups never fail the ingest.
    pub async fn ingest(&self, payload: Value) -> Result<Model, IngestError> {
        let NormalizedEvent {
            event_type,
            item,
            user,
            server,
            mut metadata,
        } = NormalizedEvent::from_payload(&payload);

        let is_media_added = MEDIA_ADDED_EVENTS.contains(&event_type.as_str());
        if let (true, Some(item_type), Some(item_name)) =
            (is_media_added, item.item_type.as_deref(), item.name.as_deref())
        {
            let raw_item = payload.get("Item").cloned().unwrap_or(Value::Null);

            let cover = self
                .resolver
                .fetch_cover_image(&metadata, item_type, item_name, &raw_item)
                .await;
            if let Some(cover) = &cover {
                cover.merge_into(&mut metadata);
                info!(
                    item_name = %item_name,
                    source = cover.source.as_str(),
                    "Cover image fetched"
                );
            }

            if item_type == "Episode"
                && cover.is_none()
                && let Some(series_poster) =
                    self.resolver.fetch_series_poster_for_episode(&metadata).await
            {
                series_poster.merge_into(&mut metadata);
                let series_name = metadata
                    .get("series_name")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown");
                info!(
                    item_name = %item_name,
                    series_name = %series_name,
                    "Series poster fetched for episode"
                );
            }
        }

        let event = NewWebhookEvent::new(event_type, payload)
            .with_item(&item)
            .with_user_name(user.name)
            .with_server_name(server.name)
            .with_metadata(metadata);

        let stored = WebhookEventRepository::new(&self.db).create(event).await?;
        info!(
            public_id = %stored.public_id,
            event_type = %stored.event_type,
            "Webhook event stored"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::{ArtworkProvider, ArtworkRequest, ArtworkSource, LookupScope, ResolvedArtwork};
    use async_trait::async_trait;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;
    use serde_json::json;

    /// Answers only for the series-of-episode scope.
    struct SeriesOnly;

    #[async_trait]
    impl ArtworkProvider for SeriesOnly {
        fn name(&self) -> &'static str {
            "series_only"
        }

        async fn resolve(&self, request: &ArtworkRequest) -> Option<ResolvedArtwork> {
            (request.scope == LookupScope::SeriesOfEpisode)
                .then(|| ResolvedArtwork::new("https://img/series.jpg", ArtworkSource::Tvdb))
        }
    }

    async fn ingestor(providers: Vec<Arc<dyn ArtworkProvider>>) -> WebhookIngestor {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        WebhookIngestor::new(db, Arc::new(ArtworkResolver::new(providers)))
    }

    #[tokio::test]
    async fn test_empty_payload_is_stored_as_unknown() {
        let ingestor = ingestor(vec![]).await;

        let stored = ingestor.ingest(json!({})).await.unwrap();

        assert_eq!(stored.event_type, "unknown");
        assert!(stored.item_type.is_none());
        assert!(stored.item_name.is_none());
        assert_eq!(stored.metadata, json!({}));
        assert_eq!(stored.raw_payload, json!({}));
    }

    #[tokio::test]
    async fn test_episode_without_cover_gets_series_poster() {
        let ingestor = ingestor(vec![Arc::new(SeriesOnly) as Arc<dyn ArtworkProvider>]).await;

        let stored = ingestor
            .ingest(json!({
                "Event": "library.new",
                "Item": {"Name": "Pilot", "Type": "Episode", "SeriesName": "Test Show"}
            }))
            .await
            .unwrap();

        assert_eq!(stored.metadata["poster_url"], "https://img/series.jpg");
        assert_eq!(stored.metadata["source"], "tvdb");
        assert_eq!(stored.metadata["series_name"], "Test Show");
    }

    #[tokio::test]
    async fn test_non_media_event_skips_artwork() {
        let ingestor = ingestor(vec![Arc::new(SeriesOnly) as Arc<dyn ArtworkProvider>]).await;

        let stored = ingestor
            .ingest(json!({
                "Event": "playback.start",
                "Item": {"Name": "Pilot", "Type": "Episode"},
                "User": {"Name": "alice"},
                "Server": {"Name": "den"}
            }))
            .await
            .unwrap();

        assert!(stored.metadata.get("poster_url").is_none());
        assert_eq!(stored.user_name.as_deref(), Some("alice"));
        assert_eq!(stored.server_name.as_deref(), Some("den"));
    }
}
