//! Priority-ordered artwork resolution.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::tmdb::{TmdbExternalIdLookup, TmdbTitleSearch};
use super::{ArtworkProvider, ArtworkRequest, EmbyClient, ResolvedArtwork, TmdbClient, TvdbClient};

/// Walks providers in order and returns the first artwork found.
pub struct ArtworkResolver {
    providers: Vec<Arc<dyn ArtworkProvider>>,
}

impl ArtworkResolver {
    pub fn new(providers: Vec<Arc<dyn ArtworkProvider>>) -> Self {
        Self { providers }
    }

    /// Standard chain: media server, TVDB, TMDB by IMDB id, TMDB title search.
    pub fn with_default_chain(
        emby: Arc<EmbyClient>,
        tvdb: Arc<TvdbClient>,
        tmdb: Arc<TmdbClient>,
    ) -> Self {
        Self::new(vec![
            emby as Arc<dyn ArtworkProvider>,
            tvdb as Arc<dyn ArtworkProvider>,
            Arc::new(TmdbExternalIdLookup(Arc::clone(&tmdb))) as Arc<dyn ArtworkProvider>,
            Arc::new(TmdbTitleSearch(tmdb)) as Arc<dyn ArtworkProvider>,
        ])
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|provider| provider.name()).collect()
    }

    pub async fn resolve(&self, request: &ArtworkRequest) -> Option<ResolvedArtwork> {
        for provider in &self.providers {
            if let Some(artwork) = provider.resolve(request).await {
                debug!(provider = provider.name(), source = artwork.source.as_str(), "artwork resolved");
                return Some(artwork);
            }
        }
        None
    }

    /// Cover art for a newly added item.
    pub async fn fetch_cover_image(
        &self,
        metadata: &Map<String, Value>,
        item_type: &str,
        item_name: &str,
        raw_item: &Value,
    ) -> Option<ResolvedArtwork> {
        let request = ArtworkRequest::for_item(metadata, item_type, item_name, raw_item);
        info!(
            item_name = %item_name,
            item_type = %item_type,
            tvdb_id = ?request.tvdb_id,
            imdb_id = ?request.imdb_id,
            "Fetching cover image"
        );

        let artwork = self.resolve(&request).await;
        if artwork.is_none() {
            warn!(
                item_name = %item_name,
                item_type = %item_type,
                tvdb_id = ?request.tvdb_id,
                imdb_id = ?request.imdb_id,
                "No cover image found for media item"
            );
        }
        artwork
    }

    /// Poster of the parent series, for episodes whose own image was not found.
    pub async fn fetch_series_poster_for_episode(
        &self,
        metadata: &Map<String, Value>,
    ) -> Option<ResolvedArtwork> {
        let request = ArtworkRequest::for_series_of_episode(metadata);
        self.resolve(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::{ArtworkSource, LookupScope};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records calls and answers with a fixed result.
    struct FakeProvider {
        name: &'static str,
        answer: Option<ResolvedArtwork>,
        calls: Mutex<Vec<LookupScope>>,
    }

    impl FakeProvider {
        fn new(name: &'static str, answer: Option<ResolvedArtwork>) -> Arc<Self> {
            Arc::new(Self {
                name,
                answer,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ArtworkProvider for FakeProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn resolve(&self, request: &ArtworkRequest) -> Option<ResolvedArtwork> {
            self.calls.lock().unwrap().push(request.scope);
            self.answer.clone()
        }
    }

    fn movie_metadata() -> Map<String, Value> {
        json!({"year": 1999, "provider_ids": {"IMDB": "tt0133093"}})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let first = FakeProvider::new("first", None);
        let second = FakeProvider::new(
            "second",
            Some(ResolvedArtwork::new("tvdb.jpg", ArtworkSource::Tvdb)),
        );
        let third = FakeProvider::new(
            "third",
            Some(ResolvedArtwork::new("tmdb.jpg", ArtworkSource::Tmdb)),
        );
        let resolver = ArtworkResolver::new(vec![
            first.clone() as Arc<dyn ArtworkProvider>,
            second.clone() as Arc<dyn ArtworkProvider>,
            third.clone() as Arc<dyn ArtworkProvider>,
        ]);

        let artwork = resolver
            .fetch_cover_image(&movie_metadata(), "Movie", "The Matrix", &json!({}))
            .await
            .unwrap();

        assert_eq!(artwork.source, ArtworkSource::Tvdb);
        assert_eq!(first.call_count(), 1);
        assert_eq!(second.call_count(), 1);
        assert_eq!(third.call_count(), 0);
    }

    #[tokio::test]
    async fn test_no_provider_hit_returns_none() {
        let only = FakeProvider::new("only", None);
        let resolver = ArtworkResolver::new(vec![only.clone() as Arc<dyn ArtworkProvider>]);

        assert!(resolver
            .fetch_series_poster_for_episode(&Map::new())
            .await
            .is_none());
        assert_eq!(
            only.calls.lock().unwrap().as_slice(),
            &[LookupScope::SeriesOfEpisode]
        );
    }

    #[tokio::test]
    async fn test_default_chain_order() {
        let http = reqwest::Client::new();
        let config = crate::config::AppConfig::default();
        let cache: Arc<dyn crate::cache::TokenCache> = Arc::new(crate::cache::MemoryTokenCache::new());
        let resolver = ArtworkResolver::with_default_chain(
            Arc::new(EmbyClient::new(http.clone(), &config.emby)),
            Arc::new(TvdbClient::new(http.clone(), &config.tvdb, cache)),
            Arc::new(TmdbClient::new(http, &config.tmdb)),
        );

        assert_eq!(
            resolver.provider_names(),
            vec!["emby", "tvdb", "tmdb_external_id", "tmdb_title_search"]
        );
    }

    #[tokio::test]
    async fn test_emby_wins_when_every_source_could_answer() {
        // Unconfigured TVDB/TMDB would make no calls; Emby needs no network at all.
        let http = reqwest::Client::new();
        let mut config = crate::config::AppConfig::default();
        config.emby.base_url = Some("http://emby.example.com:8096".to_string());
        let cache: Arc<dyn crate::cache::TokenCache> = Arc::new(crate::cache::MemoryTokenCache::new());
        let resolver = ArtworkResolver::with_default_chain(
            Arc::new(EmbyClient::new(http.clone(), &config.emby)),
            Arc::new(TvdbClient::new(http.clone(), &config.tvdb, cache)),
            Arc::new(TmdbClient::new(http, &config.tmdb)),
        );

        let metadata = json!({"provider_ids": {"Tvdb": "81189", "IMDB": "tt0903747"}})
            .as_object()
            .cloned()
            .unwrap();
        let raw_item = json!({"Id": "123456", "ImageTags": {"Primary": "abc123def456"}});

        let artwork = resolver
            .fetch_cover_image(&metadata, "Series", "Breaking Bad", &raw_item)
            .await
            .unwrap();

        assert_eq!(artwork.source, ArtworkSource::Emby);
        assert_eq!(
            artwork.poster_url,
            "http://emby.example.com:8096/emby/Items/123456/Images/Primary?tag=abc123def456&quality=90"
        );
    }
}
