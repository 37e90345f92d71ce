//! Media-server native images.
//!
//! Image URLs are built from identifiers already present in the webhook
//! payload, so cover resolution needs no network round-trip. Only the health
//! probe and the item metadata lookup talk to the server.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{ArtworkProvider, ArtworkRequest, ArtworkSource, LookupScope, ResolvedArtwork, endpoint_url, join_url};
use crate::config::EmbyConfig;
use crate::normalization::value_as_text;

const VERIFY_TIMEOUT: Duration = Duration::from_secs(5);
const ITEM_METADATA_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum EmbyError {
    #[error("media server base URL not configured")]
    NotConfigured,
    #[error("media server API key not configured")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid media server URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("media server returned status {status}")]
    Status { status: u16 },
}

/// Image kinds the media server serves per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Primary,
    Backdrop,
}

impl ImageType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ImageType::Primary => "Primary",
            ImageType::Backdrop => "Backdrop",
        }
    }
}

/// Client for the Emby server that sent the webhook.
#[derive(Debug, Clone)]
pub struct EmbyClient {
    http: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl EmbyClient {
    pub fn new(http: reqwest::Client, config: &EmbyConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// `{base}/emby/Items/{id}/Images/{type}?tag={tag}&quality=90`
    pub fn image_url(&self, item_id: &str, tag: &str, image_type: ImageType) -> Option<String> {
        let base_url = self.base_url.as_deref()?;
        Some(format!(
            "{}/emby/Items/{}/Images/{}?tag={}&quality=90",
            base_url.trim_end_matches('/'),
            item_id,
            image_type.as_str(),
            tag
        ))
    }

    /// Primary image of the item itself.
    pub fn resolve_cover(&self, raw_item: &Value) -> Option<ResolvedArtwork> {
        if !self.is_configured() {
            debug!("Emby base URL not configured, skipping native image");
            return None;
        }

        let item_id = raw_item.get("Id").and_then(value_as_text);
        let tag = raw_item
            .get("ImageTags")
            .and_then(|tags| tags.get("Primary"))
            .and_then(value_as_text)
            .filter(|tag| !tag.is_empty());

        let (Some(item_id), Some(tag)) = (item_id, tag) else {
            debug!("Item lacks Id or primary image tag");
            return None;
        };

        let url = self.image_url(&item_id, &tag, ImageType::Primary)?;
        info!(item_id = %item_id, image_url = %url, "Built Emby item image URL");
        Some(ResolvedArtwork::new(url, ArtworkSource::Emby))
    }

    /// Primary image of the episode's parent series.
    pub fn resolve_series_cover(&self, raw_item: &Value) -> Option<ResolvedArtwork> {
        if !self.is_configured() {
            return None;
        }

        let series_id = raw_item.get("SeriesId").and_then(value_as_text);
        let tag = raw_item
            .get("SeriesPrimaryImageTag")
            .and_then(value_as_text)
            .filter(|tag| !tag.is_empty());

        let (Some(series_id), Some(tag)) = (series_id, tag) else {
            debug!("Item lacks SeriesId or series primary image tag");
            return None;
        };

        let url = self.image_url(&series_id, &tag, ImageType::Primary)?;
        info!(series_id = %series_id, image_url = %url, "Built Emby series image URL");
        Some(ResolvedArtwork::new(url, ArtworkSource::EmbySeries))
    }

    /// First backdrop of the item, if it has any.
    pub fn resolve_backdrop(&self, raw_item: &Value) -> Option<String> {
        let item_id = raw_item.get("Id").and_then(value_as_text)?;
        let tag = raw_item
            .get("BackdropImageTags")
            .and_then(Value::as_array)
            .and_then(|tags| tags.first())
            .and_then(value_as_text)
            .filter(|tag| !tag.is_empty())?;

        self.image_url(&item_id, &tag, ImageType::Backdrop)
    }

    /// Probes the public system info endpoint.
    pub async fn verify_connection(&self) -> bool {
        let Some(base_url) = self.base_url.as_deref() else {
            return false;
        };

        let url = join_url(base_url, "emby/System/Info/Public");
        match self.http.get(&url).timeout(VERIFY_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                warn!(base_url = %base_url, error = %err, "Emby server unreachable");
                false
            }
        }
    }

    /// Fetches the server's full record for an item.
    pub async fn get_item_metadata(&self, item_id: &str) -> Option<Value> {
        match self.fetch_item_metadata(item_id).await {
            Ok(metadata) => Some(metadata),
            Err(EmbyError::NotConfigured | EmbyError::MissingApiKey) => None,
            Err(err) => {
                warn!(item_id = %item_id, error = %err, "Failed to fetch Emby item metadata");
                None
            }
        }
    }

    async fn fetch_item_metadata(&self, item_id: &str) -> Result<Value, EmbyError> {
        let base_url = self.base_url.as_deref().ok_or(EmbyError::NotConfigured)?;
        let api_key = self.api_key.as_deref().ok_or(EmbyError::MissingApiKey)?;

        let url = endpoint_url(base_url, &["emby", "Items", item_id])?;

        let response = self
            .http
            .get(url)
            .header("X-Emby-Token", api_key)
            .timeout(ITEM_METADATA_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmbyError::Status {
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ArtworkProvider for EmbyClient {
    fn name(&self) -> &'static str {
        "emby"
    }

    async fn resolve(&self, request: &ArtworkRequest) -> Option<ResolvedArtwork> {
        if request.scope != LookupScope::Item || !request.has_raw_item() {
            return None;
        }

        if let Some(cover) = self.resolve_cover(&request.raw_item) {
            return Some(cover.with_backdrop(self.resolve_backdrop(&request.raw_item)));
        }

        if request.is_episode() {
            return self.resolve_series_cover(&request.raw_item);
        }

        None
    }
}
