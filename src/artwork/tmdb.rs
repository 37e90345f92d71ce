//! Movie database client.
//!
//! Looks items up by IMDB id through `/find` or by title through `/search`.
//! Every call carries the API key as a query parameter.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use super::{
    ArtworkProvider, ArtworkRequest, ArtworkSource, LookupScope, MediaKind, ResolvedArtwork,
    endpoint_url,
};
use crate::config::TmdbConfig;

pub const POSTER_BASE: &str = "https://image.tmdb.org/t/p/w500";
pub const BACKDROP_BASE: &str = "https://image.tmdb.org/t/p/w1280";

#[derive(Debug, Error)]
pub enum TmdbError {
    #[error("TMDB API key not configured")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid TMDB URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("TMDB returned status {status}")]
    Status { status: u16 },
}

pub struct TmdbClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl TmdbClient {
    pub fn new(http: reqwest::Client, config: &TmdbConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    pub async fn get_movie_poster(&self, imdb_id: &str) -> Option<ResolvedArtwork> {
        self.find_by_imdb_id(imdb_id, MediaKind::Movie).await
    }

    pub async fn get_tv_show_poster(&self, imdb_id: &str) -> Option<ResolvedArtwork> {
        self.find_by_imdb_id(imdb_id, MediaKind::Tv).await
    }

    async fn find_by_imdb_id(&self, imdb_id: &str, kind: MediaKind) -> Option<ResolvedArtwork> {
        let results_key = match kind {
            MediaKind::Movie => "movie_results",
            MediaKind::Tv => "tv_results",
        };
        let query = [("external_source", "imdb_id".to_string())];

        match self.get(&["find", imdb_id], &query).await {
            Ok(body) => first_result_artwork(&body, results_key),
            Err(TmdbError::MissingApiKey) => {
                warn!("TMDB API key not configured");
                None
            }
            Err(err) => {
                error!(imdb_id = %imdb_id, kind = kind.as_str(), error = %err, "Failed to fetch TMDB poster");
                None
            }
        }
    }

    /// Searches by title, narrowed by release year (movies) or first air year (tv).
    pub async fn search_by_title(
        &self,
        title: &str,
        year: Option<i64>,
        kind: MediaKind,
    ) -> Option<ResolvedArtwork> {
        let path = match kind {
            MediaKind::Movie => ["search", "movie"],
            MediaKind::Tv => ["search", "tv"],
        };
        let mut query = vec![("query", title.to_string())];
        if let Some(year) = year {
            let year_param = match kind {
                MediaKind::Movie => "year",
                MediaKind::Tv => "first_air_date_year",
            };
            query.push((year_param, year.to_string()));
        }

        match self.get(&path, &query).await {
            Ok(body) => first_result_artwork(&body, "results"),
            Err(TmdbError::MissingApiKey) => {
                warn!("TMDB API key not configured");
                None
            }
            Err(err) => {
                error!(title = %title, ?year, kind = kind.as_str(), error = %err, "Failed to search TMDB by title");
                None
            }
        }
    }

    async fn get(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Value, TmdbError> {
        let api_key = self.api_key.as_deref().ok_or(TmdbError::MissingApiKey)?;
        let url = endpoint_url(&self.api_url, segments)?;

        let response = self
            .http
            .get(url)
            .query(&[("api_key", api_key)])
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TmdbError::Status {
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}

/// Artwork of the first entry under `results_key`, which must carry a `poster_path`.
fn first_result_artwork(body: &Value, results_key: &str) -> Option<ResolvedArtwork> {
    let entry = body.get(results_key)?.as_array()?.first()?;
    let poster_path = entry.get("poster_path")?.as_str()?;
    let backdrop_url = entry
        .get("backdrop_path")
        .and_then(Value::as_str)
        .map(|backdrop_path| format!("{}{}", BACKDROP_BASE, backdrop_path));

    Some(
        ResolvedArtwork::new(format!("{}{}", POSTER_BASE, poster_path), ArtworkSource::Tmdb)
            .with_backdrop(backdrop_url),
    )
}

/// Chain entry resolving through an IMDB id.
pub struct TmdbExternalIdLookup(pub Arc<TmdbClient>);

#[async_trait]
impl ArtworkProvider for TmdbExternalIdLookup {
    fn name(&self) -> &'static str {
        "tmdb_external_id"
    }

    async fn resolve(&self, request: &ArtworkRequest) -> Option<ResolvedArtwork> {
        let imdb_id = request.imdb_id.as_deref()?;
        let artwork = match request.scope {
            LookupScope::Item if !request.is_tv() => self.0.get_movie_poster(imdb_id).await,
            LookupScope::Item | LookupScope::SeriesOfEpisode => {
                self.0.get_tv_show_poster(imdb_id).await
            }
        };

        if artwork.is_some() {
            info!(imdb_id = %imdb_id, "Fetched image from TMDB using IMDB id");
        }
        artwork
    }
}

/// Chain entry of last resort: title search.
pub struct TmdbTitleSearch(pub Arc<TmdbClient>);

#[async_trait]
impl ArtworkProvider for TmdbTitleSearch {
    fn name(&self) -> &'static str {
        "tmdb_title_search"
    }

    async fn resolve(&self, request: &ArtworkRequest) -> Option<ResolvedArtwork> {
        let title = request.title.as_deref()?;
        let kind = match request.scope {
            LookupScope::Item => MediaKind::for_item_type(&request.item_type),
            LookupScope::SeriesOfEpisode => MediaKind::Tv,
        };

        let artwork = self.0.search_by_title(title, request.year, kind).await;
        if artwork.is_some() {
            info!(title = %title, year = ?request.year, kind = kind.as_str(), "Fetched image from TMDB title search");
        }
        artwork
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, api_key: Option<&str>) -> TmdbClient {
        TmdbClient::new(
            reqwest::Client::new(),
            &TmdbConfig {
                api_key: api_key.map(str::to_string),
                api_url: server.uri(),
            },
        )
    }

    #[tokio::test]
    async fn test_movie_poster_by_imdb_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/find/tt0133093"))
            .and(query_param("api_key", "tmdb-key"))
            .and(query_param("external_source", "imdb_id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "movie_results": [{"poster_path": "/matrix.jpg", "backdrop_path": "/matrix-bg.jpg"}],
                "tv_results": []
            })))
            .mount(&server)
            .await;

        let tmdb = client(&server, Some("tmdb-key"));
        let artwork = tmdb.get_movie_poster("tt0133093").await.unwrap();

        assert_eq!(artwork.poster_url, "https://image.tmdb.org/t/p/w500/matrix.jpg");
        assert_eq!(
            artwork.backdrop_url.as_deref(),
            Some("https://image.tmdb.org/t/p/w1280/matrix-bg.jpg")
        );
        assert_eq!(artwork.source, ArtworkSource::Tmdb);

        assert!(tmdb.get_tv_show_poster("tt0133093").await.is_none());
    }

    #[tokio::test]
    async fn test_imdb_id_is_encoded_as_single_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/find/tt1%2Fx%3Fy"))
            .and(query_param("external_source", "imdb_id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "movie_results": [{"poster_path": "/odd.jpg"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let artwork = client(&server, Some("tmdb-key"))
            .get_movie_poster("tt1/x?y")
            .await
            .unwrap();

        assert_eq!(artwork.poster_url, "https://image.tmdb.org/t/p/w500/odd.jpg");
    }

    #[tokio::test]
    async fn test_tv_search_uses_first_air_date_year() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/tv"))
            .and(query_param("query", "Breaking Bad"))
            .and(query_param("first_air_date_year", "2008"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"poster_path": "/bb.jpg"}]
            })))
            .mount(&server)
            .await;

        let artwork = client(&server, Some("tmdb-key"))
            .search_by_title("Breaking Bad", Some(2008), MediaKind::Tv)
            .await
            .unwrap();

        assert_eq!(artwork.poster_url, "https://image.tmdb.org/t/p/w500/bb.jpg");
        assert!(artwork.backdrop_url.is_none());
    }

    #[tokio::test]
    async fn test_result_without_poster_path_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"poster_path": null, "backdrop_path": "/bg.jpg"}]
            })))
            .mount(&server)
            .await;

        assert!(client(&server, Some("tmdb-key"))
            .search_by_title("Obscure", None, MediaKind::Movie)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_missing_api_key_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tmdb = client(&server, None);
        assert!(tmdb.get_movie_poster("tt1").await.is_none());
        assert!(tmdb.search_by_title("x", None, MediaKind::Movie).await.is_none());
    }

    #[tokio::test]
    async fn test_server_error_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(client(&server, Some("k")).get_tv_show_poster("tt1").await.is_none());
    }
}
