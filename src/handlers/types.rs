//! # Dashboard View Models
//!
//! JSON shapes served by the dashboard endpoints. Display flags from
//! configuration are applied here, so hidden fields never leave the server.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::DashboardConfig;
use crate::models::webhook_event::Model;
use crate::repositories::WebhookEventPage;

/// Emby runtimes are reported in 100ns ticks.
const TICKS_PER_SECOND: i64 = 10_000_000;

const MAX_CARD_GENRES: usize = 3;

/// Display toggles echoed back so clients know which fields were withheld.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct DisplayFlags {
    pub show_raw_data: bool,
    pub show_file_location: bool,
    pub show_event_details: bool,
}

impl From<&DashboardConfig> for DisplayFlags {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            show_raw_data: config.show_raw_data,
            show_file_location: config.show_file_location,
            show_event_details: config.show_event_details,
        }
    }
}

/// One event as shown in the dashboard list.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookCard {
    pub public_id: Uuid,
    #[schema(example = "library.new")]
    pub event_type: String,
    pub item_type: Option<String>,
    pub item_name: Option<String>,
    /// Withheld unless file locations are shown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_path: Option<String>,
    /// Withheld unless event details are shown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    /// Poster, falling back to the backdrop
    pub image_url: Option<String>,
    /// `Series - S01E02` for episodes
    #[schema(example = "Breaking Bad - S01E02")]
    pub series_label: Option<String>,
    pub year: Option<i64>,
    /// `HH:MM`
    #[schema(example = "01:58")]
    pub runtime: Option<String>,
    pub community_rating: Option<f64>,
    pub genres: Vec<String>,
    pub is_media_added: bool,
    pub recently_added: bool,
    pub created_at: DateTime<Utc>,
    #[schema(example = "Jul 25, 2025 14:20:56")]
    pub created_at_formatted: String,
}

impl WebhookCard {
    pub fn from_model(model: &Model, config: &DashboardConfig, now: DateTime<Utc>) -> Self {
        let text = |key: &str| {
            model
                .metadata_field(key)
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        };

        let image_url = text("poster_url").or_else(|| text("backdrop_url"));
        let series_label = match (
            text("series_name"),
            model.metadata_field("season_number").and_then(as_integer),
            model.metadata_field("episode_number").and_then(as_integer),
        ) {
            (Some(series), Some(season), Some(episode)) => {
                Some(format!("{} - S{:02}E{:02}", series, season, episode))
            }
            _ => None,
        };

        let genres = model
            .metadata_field("genres")
            .and_then(JsonValue::as_array)
            .map(|genres| {
                genres
                    .iter()
                    .filter_map(JsonValue::as_str)
                    .take(MAX_CARD_GENRES)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let show_details = config.show_event_details;

        Self {
            public_id: model.public_id,
            event_type: model.event_type.clone(),
            item_type: model.item_type.clone(),
            item_name: model.item_name.clone(),
            item_path: model
                .item_path
                .clone()
                .filter(|_| config.show_file_location),
            user_name: model.user_name.clone().filter(|_| show_details),
            server_name: model.server_name.clone().filter(|_| show_details),
            image_url,
            series_label,
            year: model.metadata_field("year").and_then(as_integer),
            runtime: model
                .metadata_field("runtime")
                .and_then(as_integer)
                .and_then(format_runtime),
            community_rating: model
                .metadata_field("community_rating")
                .and_then(JsonValue::as_f64)
                .filter(|rating| *rating > 0.0),
            genres,
            is_media_added: model.is_media_added(),
            recently_added: model.is_recently_added(now, config.recently_added_window()),
            created_at: model.created_at.with_timezone(&Utc),
            created_at_formatted: model.formatted_created_at(),
        }
    }
}

/// A page of dashboard cards with navigation data.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardPage {
    pub data: Vec<WebhookCard>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub last_page: u64,
    pub has_more: bool,
    /// How often clients should poll for new events
    pub refresh_interval_seconds: u64,
    pub display: DisplayFlags,
}

impl DashboardPage {
    pub fn new(page: WebhookEventPage, config: &DashboardConfig, now: DateTime<Utc>) -> Self {
        let has_more = page.has_more();
        Self {
            data: page
                .items
                .iter()
                .map(|model| WebhookCard::from_model(model, config, now))
                .collect(),
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            last_page: page.last_page,
            has_more,
            refresh_interval_seconds: config.refresh_seconds,
            display: config.into(),
        }
    }
}

/// Who triggered an event and where.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventSource {
    pub user_name: Option<String>,
    pub server_name: Option<String>,
}

/// Single event with its full metadata.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookDetail {
    #[serde(flatten)]
    pub card: WebhookCard,
    pub metadata: JsonValue,
    /// Payload as received; withheld unless raw data is shown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<EventSource>,
    pub display: DisplayFlags,
}

impl WebhookDetail {
    pub fn from_model(model: Model, config: &DashboardConfig, now: DateTime<Utc>) -> Self {
        let card = WebhookCard::from_model(&model, config, now);
        let source = config.show_event_details.then(|| EventSource {
            user_name: model.user_name.clone(),
            server_name: model.server_name.clone(),
        });

        Self {
            card,
            metadata: model.metadata,
            raw_payload: config.show_raw_data.then_some(model.raw_payload),
            source,
            display: config.into(),
        }
    }
}

/// Health probe response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "emby-webhooks")]
    pub service: String,
    pub version: String,
    /// `ok` or `degraded`
    #[schema(example = "ok")]
    pub status: String,
    pub database: bool,
    /// Whether the media server answered; false when it is not configured
    pub emby_reachable: bool,
}

/// Integer from a JSON number or numeric string.
fn as_integer(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64)),
        JsonValue::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn format_runtime(ticks: i64) -> Option<String> {
    if ticks <= 0 {
        return None;
    }
    let seconds = ticks / TICKS_PER_SECOND;
    Some(format!("{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60))
}
