//! Webhook event entity model
//!
//! This module contains the SeaORM entity model for the emby_webhook_events table,
//! which stores one row per inbound media-server notification.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Event types the media server emits when an item lands in a library
pub const MEDIA_ADDED_EVENTS: [&str; 2] = ["library.new", "item.added"];

/// Webhook event entity. Rows are written once and never updated.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "emby_webhook_events")]
pub struct Model {
    /// Internal sequential key
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Externally addressable identifier, the only id exposed in URLs
    #[sea_orm(unique)]
    pub public_id: Uuid,

    /// Event name reported by the media server, `unknown` when absent
    pub event_type: String,

    pub item_type: Option<String>,

    pub item_name: Option<String>,

    pub item_path: Option<String>,

    pub user_name: Option<String>,

    pub server_name: Option<String>,

    /// Normalized and artwork-enriched item fields
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: JsonValue,

    /// Payload exactly as received
    #[sea_orm(column_type = "JsonBinary")]
    pub raw_payload: JsonValue,

    /// Timestamp when the event was received
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether this event announces a newly added library item.
    pub fn is_media_added(&self) -> bool {
        MEDIA_ADDED_EVENTS.contains(&self.event_type.as_str())
    }

    /// Whether the event was received within `window` of `now`.
    pub fn is_recently_added(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        window: chrono::Duration,
    ) -> bool {
        let created = self.created_at.with_timezone(&chrono::Utc);
        created <= now && now - created <= window
    }

    /// Looks up a metadata field by key.
    pub fn metadata_field(&self, key: &str) -> Option<&JsonValue> {
        self.metadata.as_object().and_then(|map| map.get(key))
    }

    /// Creation timestamp rendered the way the dashboard shows it.
    pub fn formatted_created_at(&self) -> String {
        self.created_at.format("%b %d, %Y %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn sample(event_type: &str, created_at: chrono::DateTime<Utc>) -> Model {
        Model {
            id: 1,
            public_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            item_type: Some("Movie".to_string()),
            item_name: Some("Test Movie".to_string()),
            item_path: None,
            user_name: None,
            server_name: None,
            metadata: json!({"year": 2023}),
            raw_payload: json!({}),
            created_at: created_at.into(),
        }
    }

    #[test]
    fn test_is_media_added() {
        let now = Utc::now();
        assert!(sample("library.new", now).is_media_added());
        assert!(sample("item.added", now).is_media_added());
        assert!(!sample("playback.start", now).is_media_added());
    }

    #[test]
    fn test_recently_added_window() {
        let now = Utc::now();
        let window = Duration::minutes(60);

        assert!(sample("library.new", now - Duration::minutes(5)).is_recently_added(now, window));
        assert!(!sample("library.new", now - Duration::minutes(61)).is_recently_added(now, window));
    }

    #[test]
    fn test_formatted_created_at() {
        let created = Utc.with_ymd_and_hms(2025, 7, 25, 14, 20, 56).unwrap();
        assert_eq!(
            sample("library.new", created).formatted_created_at(),
            "Jul 25, 2025 14:20:56"
        );
    }

    #[test]
    fn test_metadata_field() {
        let model = sample("library.new", Utc::now());
        assert_eq!(model.metadata_field("year"), Some(&json!(2023)));
        assert_eq!(model.metadata_field("missing"), None);
    }
}
