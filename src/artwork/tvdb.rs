//! TV metadata database client.
//!
//! Authenticated with a bearer token obtained from `/login`. The token is kept
//! in the injected [`TokenCache`] under [`TOKEN_CACHE_KEY`] for 23 hours and
//! mirrored in memory with the same expiry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{ArtworkProvider, ArtworkRequest, ArtworkSource, LookupScope, ResolvedArtwork, endpoint_url, join_url};
use crate::cache::TokenCache;
use crate::config::TvdbConfig;

pub const TOKEN_CACHE_KEY: &str = "tvdb_auth_token";
/// Tokens are valid for 24 hours upstream; refresh an hour early.
pub const TOKEN_TTL: Duration = Duration::from_secs(23 * 60 * 60);
pub const ARTWORK_HOST: &str = "https://artworks.thetvdb.com";

#[derive(Debug, Error)]
pub enum TvdbError {
    #[error("TVDB API key not configured")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid TVDB URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("TVDB returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("TVDB login response carried no token")]
    MissingToken,
}

#[derive(Debug, Clone)]
struct HeldToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl HeldToken {
    fn is_live(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

pub struct TvdbClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    cache: Arc<dyn TokenCache>,
    held: RwLock<Option<HeldToken>>,
}

impl TvdbClient {
    pub fn new(http: reqwest::Client, config: &TvdbConfig, cache: Arc<dyn TokenCache>) -> Self {
        Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            cache,
            held: RwLock::new(None),
        }
    }

    /// Returns a usable bearer token, logging in when neither memory nor cache holds one.
    pub async fn get_auth_token(&self) -> Option<String> {
        match self.acquire_token().await {
            Ok(token) => Some(token),
            Err(TvdbError::MissingApiKey) => {
                warn!("TVDB API key not configured");
                None
            }
            Err(err) => {
                error!(error = %err, "Failed to authenticate with TVDB API");
                None
            }
        }
    }

    async fn acquire_token(&self) -> Result<String, TvdbError> {
        if let Some(held) = self.held.read().await.as_ref().filter(|t| t.is_live()) {
            return Ok(held.value.clone());
        }

        match self.cache.get(TOKEN_CACHE_KEY).await {
            Ok(Some(cached)) => {
                debug!("Using cached TVDB token");
                self.hold(cached.value.clone(), cached.expires_at).await;
                return Ok(cached.value);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "TVDB token cache read failed"),
        }

        let token = self.login().await?;

        if let Err(err) = self.cache.put(TOKEN_CACHE_KEY, &token, TOKEN_TTL).await {
            warn!(error = %err, "Failed to cache TVDB token");
        }
        let expires_at = chrono::Duration::from_std(TOKEN_TTL)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or_else(Utc::now);
        self.hold(token.clone(), expires_at).await;

        Ok(token)
    }

    async fn hold(&self, value: String, expires_at: DateTime<Utc>) {
        *self.held.write().await = Some(HeldToken { value, expires_at });
    }

    async fn login(&self) -> Result<String, TvdbError> {
        let api_key = self.api_key.as_deref().ok_or(TvdbError::MissingApiKey)?;

        let response = self
            .http
            .post(join_url(&self.api_url, "login"))
            .json(&json!({ "apikey": api_key }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TvdbError::Status { status, body });
        }

        let body: Value = response.json().await?;
        let token = body
            .pointer("/data/token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or(TvdbError::MissingToken)?;

        info!("Authenticated with TVDB API");
        Ok(token.to_string())
    }

    /// Forgets the current token in memory and in the cache.
    async fn discard_token(&self) {
        *self.held.write().await = None;
        if let Err(err) = self.cache.remove(TOKEN_CACHE_KEY).await {
            warn!(error = %err, "Failed to evict TVDB token from cache");
        }
    }

    async fn get_authorized(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Option<Value>, TvdbError> {
        let url = endpoint_url(&self.api_url, segments)?;
        let Some(token) = self.get_auth_token().await else {
            return Ok(None);
        };

        let response = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.discard_token().await;
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TvdbError::Status { status, body });
        }

        Ok(Some(response.json().await?))
    }

    /// First poster in the series' artwork list.
    pub async fn get_series_artwork(&self, tvdb_id: &str) -> Option<ResolvedArtwork> {
        let segments = ["series", tvdb_id, "artworks"];
        match self.get_authorized(&segments, &[("type", "poster")]).await {
            Ok(Some(body)) => body
                .get("data")
                .and_then(Value::as_array)
                .and_then(|artworks| artworks.first())
                .and_then(|artwork| artwork.get("image"))
                .and_then(artwork_from_image),
            Ok(None) => None,
            Err(err) => {
                error!(tvdb_id = %tvdb_id, error = %err, "Failed to fetch TVDB series artwork");
                None
            }
        }
    }

    /// Still image of a single episode.
    pub async fn get_episode_artwork(&self, tvdb_id: &str) -> Option<ResolvedArtwork> {
        match self
            .get_authorized(&["episodes", tvdb_id, "extended"], &[])
            .await
        {
            Ok(Some(body)) => body.pointer("/data/image").and_then(artwork_from_image),
            Ok(None) => None,
            Err(err) => {
                error!(tvdb_id = %tvdb_id, error = %err, "Failed to fetch TVDB episode artwork");
                None
            }
        }
    }
}

fn artwork_from_image(image: &Value) -> Option<ResolvedArtwork> {
    let image = image.as_str().filter(|image| !image.is_empty())?;
    let url = if image.starts_with("http://") || image.starts_with("https://") {
        image.to_string()
    } else {
        format!("{}{}", ARTWORK_HOST, image)
    };
    Some(ResolvedArtwork::new(url, ArtworkSource::Tvdb))
}

#[async_trait]
impl ArtworkProvider for TvdbClient {
    fn name(&self) -> &'static str {
        "tvdb"
    }

    async fn resolve(&self, request: &ArtworkRequest) -> Option<ResolvedArtwork> {
        let tvdb_id = request.tvdb_id.as_deref()?;
        let artwork = match request.scope {
            LookupScope::Item if !request.is_tv() => return None,
            LookupScope::Item if request.is_episode() => self.get_episode_artwork(tvdb_id).await,
            LookupScope::Item | LookupScope::SeriesOfEpisode => {
                self.get_series_artwork(tvdb_id).await
            }
        };

        if artwork.is_some() {
            info!(tvdb_id = %tvdb_id, "Fetched image from TVDB");
        }
        artwork
    }
}
