//! Cover-art resolution.
//!
//! Each external source implements [`ArtworkProvider`]; the
//! [`resolver::ArtworkResolver`] walks them in priority order and keeps the
//! first hit. Provider failures are logged inside the clients and surface as
//! `None`, never as errors.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;
use utoipa::ToSchema;

use crate::normalization::value_as_text;

pub mod emby;
pub mod resolver;
pub mod tmdb;
pub mod tvdb;

pub use emby::EmbyClient;
pub use resolver::ArtworkResolver;
pub use tmdb::TmdbClient;
pub use tvdb::TvdbClient;

/// Item types served by TV metadata sources.
pub const TV_ITEM_TYPES: [&str; 3] = ["Episode", "Season", "Series"];

/// Where a resolved image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtworkSource {
    /// Item's own primary image on the media server
    Emby,
    /// Parent series image on the media server
    EmbySeries,
    Tvdb,
    Tmdb,
}

impl ArtworkSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            ArtworkSource::Emby => "emby",
            ArtworkSource::EmbySeries => "emby_series",
            ArtworkSource::Tvdb => "tvdb",
            ArtworkSource::Tmdb => "tmdb",
        }
    }
}

/// Image URLs chosen for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResolvedArtwork {
    pub poster_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backdrop_url: Option<String>,
    pub source: ArtworkSource,
}

impl ResolvedArtwork {
    pub fn new(poster_url: impl Into<String>, source: ArtworkSource) -> Self {
        Self {
            poster_url: poster_url.into(),
            backdrop_url: None,
            source,
        }
    }

    pub fn with_backdrop(mut self, backdrop_url: Option<String>) -> Self {
        self.backdrop_url = backdrop_url;
        self
    }

    /// Writes `poster_url`, `backdrop_url` (when present) and `source` into `metadata`.
    pub fn merge_into(&self, metadata: &mut Map<String, Value>) {
        metadata.insert(
            "poster_url".to_string(),
            Value::String(self.poster_url.clone()),
        );
        if let Some(backdrop_url) = &self.backdrop_url {
            metadata.insert(
                "backdrop_url".to_string(),
                Value::String(backdrop_url.clone()),
            );
        }
        metadata.insert(
            "source".to_string(),
            Value::String(self.source.as_str().to_string()),
        );
    }
}

/// Search category for title lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    pub fn for_item_type(item_type: &str) -> Self {
        if TV_ITEM_TYPES.contains(&item_type) {
            MediaKind::Tv
        } else {
            MediaKind::Movie
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }
}

/// Which image a lookup is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupScope {
    /// The item itself
    Item,
    /// The parent series of an episode whose own image was not found
    SeriesOfEpisode,
}

/// Everything a provider may use to locate artwork.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtworkRequest {
    pub scope: LookupScope,
    pub item_type: String,
    /// Item name, or the series name for [`LookupScope::SeriesOfEpisode`]
    pub title: Option<String>,
    pub year: Option<i64>,
    pub tvdb_id: Option<String>,
    pub imdb_id: Option<String>,
    /// Raw `Item` object from the webhook payload
    pub raw_item: Value,
}

impl ArtworkRequest {
    /// Lookup for the item's own cover.
    pub fn for_item(
        metadata: &Map<String, Value>,
        item_type: &str,
        item_name: &str,
        raw_item: &Value,
    ) -> Self {
        Self {
            scope: LookupScope::Item,
            item_type: item_type.to_string(),
            title: Some(item_name.to_string()).filter(|name| !name.is_empty()),
            year: metadata_year(metadata),
            tvdb_id: provider_id(metadata, "Tvdb"),
            imdb_id: provider_id(metadata, "IMDB"),
            raw_item: raw_item.clone(),
        }
    }

    /// Lookup for the series poster of an episode.
    pub fn for_series_of_episode(metadata: &Map<String, Value>) -> Self {
        Self {
            scope: LookupScope::SeriesOfEpisode,
            item_type: "Episode".to_string(),
            title: metadata
                .get("series_name")
                .and_then(value_as_text)
                .filter(|name| !name.is_empty()),
            year: metadata_year(metadata),
            tvdb_id: provider_id(metadata, "Tvdb"),
            imdb_id: provider_id(metadata, "IMDB"),
            raw_item: Value::Null,
        }
    }

    pub fn is_tv(&self) -> bool {
        TV_ITEM_TYPES.contains(&self.item_type.as_str())
    }

    pub fn is_episode(&self) -> bool {
        self.item_type == "Episode"
    }

    /// Whether the webhook carried a non-empty `Item` object.
    pub fn has_raw_item(&self) -> bool {
        self.raw_item
            .as_object()
            .map(|item| !item.is_empty())
            .unwrap_or(false)
    }
}

/// Reads `provider_ids.{key}`. Strings and numbers are accepted; empty strings are absent.
pub fn provider_id(metadata: &Map<String, Value>, key: &str) -> Option<String> {
    metadata
        .get("provider_ids")
        .and_then(|ids| ids.get(key))
        .and_then(|value| match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|id| !id.is_empty())
}

/// Reads `year` as an integer or numeric string.
pub fn metadata_year(metadata: &Map<String, Value>) -> Option<i64> {
    match metadata.get("year")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One cover-art source in the resolution chain.
#[async_trait]
pub trait ArtworkProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Attempts to find artwork. `None` means "try the next provider".
    async fn resolve(&self, request: &ArtworkRequest) -> Option<ResolvedArtwork>;
}

/// Builds the HTTP client shared by every provider.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("emby-webhooks/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Joins a base URL and a path, tolerating a trailing slash on the base.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Appends path segments to `base`, percent-encoding each one so an id taken
/// from a payload stays a single segment.
pub(crate) fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
