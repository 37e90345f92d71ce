//! Normalization of raw media-server webhook payloads.
//!
//! Pure transformations from the webhook JSON tree into the fields stored on a
//! [`crate::models::webhook_event::Model`]. Missing or oddly typed keys are
//! tolerated and never produce an error.

use serde_json::{Map, Value, json};

/// Event type recorded when the payload names none.
pub const UNKNOWN_EVENT_TYPE: &str = "unknown";

/// `(metadata key, Item key, default)` for the flat metadata copy.
const ITEM_METADATA_FIELDS: &[(&str, &str, FieldDefault)] = &[
    ("overview", "Overview", FieldDefault::Null),
    ("year", "ProductionYear", FieldDefault::Null),
    ("premiere_date", "PremiereDate", FieldDefault::Null),
    ("end_date", "EndDate", FieldDefault::Null),
    ("runtime", "RunTimeTicks", FieldDefault::Null),
    ("genres", "Genres", FieldDefault::EmptyArray),
    ("tags", "Tags", FieldDefault::EmptyArray),
    ("community_rating", "CommunityRating", FieldDefault::Null),
    ("official_rating", "OfficialRating", FieldDefault::Null),
    ("date_created", "DateCreated", FieldDefault::Null),
    ("provider_ids", "ProviderIds", FieldDefault::EmptyObject),
    ("external_urls", "ExternalUrls", FieldDefault::EmptyArray),
    ("media_type", "MediaType", FieldDefault::Null),
    ("container", "Container", FieldDefault::Null),
    ("size", "Size", FieldDefault::Null),
];

#[derive(Debug, Clone, Copy)]
enum FieldDefault {
    Null,
    EmptyArray,
    EmptyObject,
}

impl FieldDefault {
    fn value(self) -> Value {
        match self {
            FieldDefault::Null => Value::Null,
            FieldDefault::EmptyArray => json!([]),
            FieldDefault::EmptyObject => json!({}),
        }
    }
}

/// Item section of a webhook payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemData {
    pub item_type: Option<String>,
    pub name: Option<String>,
    pub path: Option<String>,
    /// `Series.Name` when the payload carries a series object
    pub series: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserData {
    pub name: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerData {
    pub name: Option<String>,
    pub id: Option<String>,
    pub version: Option<String>,
}

/// Everything the ingestion pipeline needs from one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub event_type: String,
    pub item: ItemData,
    pub user: UserData,
    pub server: ServerData,
    pub metadata: Map<String, Value>,
}

impl NormalizedEvent {
    /// Normalize a raw payload. Non-object payloads yield an `unknown` event with empty sections.
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            event_type: extract_event_type(payload),
            item: extract_item_data(payload),
            user: extract_user_data(payload),
            server: extract_server_data(payload),
            metadata: extract_metadata(payload),
        }
    }
}

/// Renders a scalar JSON value as text. `null` yields `None`.
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn object_field<'a>(payload: &'a Value, key: &str) -> Option<&'a Map<String, Value>> {
    payload.get(key).and_then(Value::as_object)
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(value_as_text)
}

/// `Event`, falling back to `NotificationType`, then `unknown`.
pub fn extract_event_type(payload: &Value) -> String {
    ["Event", "NotificationType"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(value_as_text))
        .unwrap_or_else(|| UNKNOWN_EVENT_TYPE.to_string())
}

pub fn extract_item_data(payload: &Value) -> ItemData {
    let mut data = ItemData::default();

    if let Some(item) = object_field(payload, "Item") {
        data.item_type = text_field(item, "Type");
        data.name = text_field(item, "Name");
        data.path = text_field(item, "Path");
    }

    if let Some(series) = object_field(payload, "Series") {
        data.series = text_field(series, "Name");
    }

    data
}

pub fn extract_user_data(payload: &Value) -> UserData {
    object_field(payload, "User")
        .map(|user| UserData {
            name: text_field(user, "Name"),
            id: text_field(user, "Id"),
        })
        .unwrap_or_default()
}

pub fn extract_server_data(payload: &Value) -> ServerData {
    object_field(payload, "Server")
        .map(|server| ServerData {
            name: text_field(server, "Name"),
            id: text_field(server, "Id"),
            version: text_field(server, "Version"),
        })
        .unwrap_or_default()
}

/// Builds the flat metadata map from the `Item` object.
///
/// Series context comes from the `Series` object when present, otherwise from
/// `Item.SeriesName`. The result never holds `null` or `""` values.
pub fn extract_metadata(payload: &Value) -> Map<String, Value> {
    let Some(item) = object_field(payload, "Item") else {
        return Map::new();
    };

    let mut metadata = Map::new();
    for (key, source, default) in ITEM_METADATA_FIELDS {
        let value = match item.get(*source) {
            Some(Value::Null) | None => default.value(),
            Some(value) => value.clone(),
        };
        metadata.insert((*key).to_string(), value);
    }

    let series_name = match object_field(payload, "Series") {
        Some(series) => Some(series.get("Name").cloned().unwrap_or(Value::Null)),
        None => item
            .get("SeriesName")
            .filter(|value| !value.is_null())
            .cloned(),
    };

    if let Some(series_name) = series_name {
        metadata.insert("series_name".to_string(), series_name);
        metadata.insert(
            "season_number".to_string(),
            item.get("ParentIndexNumber").cloned().unwrap_or(Value::Null),
        );
        metadata.insert(
            "episode_number".to_string(),
            item.get("IndexNumber").cloned().unwrap_or(Value::Null),
        );
    }

    strip_empty_values(metadata)
}

/// Drops every entry whose value is `null` or the empty string.
///
/// Empty arrays and objects are kept.
pub fn strip_empty_values(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter(|(_, value)| !is_empty_value(value))
        .collect()
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode_payload() -> Value {
        json!({
            "Event": "library.new",
            "Item": {
                "Name": "Pilot",
                "Type": "Episode",
                "Path": "/media/tv/show/s01e01.mkv",
                "SeriesName": "Test Show",
                "ParentIndexNumber": 1,
                "IndexNumber": 1,
                "ProductionYear": 2024,
                "Overview": "",
                "OfficialRating": null,
                "ProviderIds": {"Tvdb": "12345"}
            },
            "User": {"Name": "alice", "Id": "u-1"},
            "Server": {"Name": "Living Room", "Id": "s-1", "Version": "4.8.0"}
        })
    }

    #[test]
    fn test_event_type_precedence() {
        assert_eq!(
            extract_event_type(&json!({"Event": "item.added", "NotificationType": "other"})),
            "item.added"
        );
        assert_eq!(
            extract_event_type(&json!({"NotificationType": "playback.start"})),
            "playback.start"
        );
        assert_eq!(
            extract_event_type(&json!({"Event": null, "NotificationType": "x"})),
            "x"
        );
        assert_eq!(extract_event_type(&json!({})), UNKNOWN_EVENT_TYPE);
        assert_eq!(extract_event_type(&json!([1, 2])), UNKNOWN_EVENT_TYPE);
        assert_eq!(extract_event_type(&json!({"Event": 7})), "7");
    }

    #[test]
    fn test_episode_metadata() {
        let metadata = extract_metadata(&episode_payload());

        assert_eq!(metadata["series_name"], "Test Show");
        assert_eq!(metadata["season_number"], 1);
        assert_eq!(metadata["episode_number"], 1);
        assert_eq!(metadata["year"], 2024);
        assert_eq!(metadata["genres"], json!([]));
        assert_eq!(metadata["provider_ids"], json!({"Tvdb": "12345"}));
        assert!(!metadata.contains_key("overview"));
        assert!(!metadata.contains_key("official_rating"));
        assert!(!metadata.contains_key("runtime"));
    }

    #[test]
    fn test_series_object_wins_over_series_name() {
        let mut payload = episode_payload();
        payload["Series"] = json!({"Name": "From Series Object"});

        let metadata = extract_metadata(&payload);
        assert_eq!(metadata["series_name"], "From Series Object");

        let item = extract_item_data(&payload);
        assert_eq!(item.series.as_deref(), Some("From Series Object"));
    }

    #[test]
    fn test_movie_has_no_series_keys() {
        let metadata = extract_metadata(&json!({
            "Item": {"Name": "Film", "Type": "Movie", "ParentIndexNumber": 3}
        }));

        assert!(!metadata.contains_key("series_name"));
        assert!(!metadata.contains_key("season_number"));
        assert_eq!(metadata["tags"], json!([]));
        assert_eq!(metadata["external_urls"], json!([]));
    }

    #[test]
    fn test_sections_extracted() {
        let event = NormalizedEvent::from_payload(&episode_payload());

        assert_eq!(event.event_type, "library.new");
        assert_eq!(event.item.item_type.as_deref(), Some("Episode"));
        assert_eq!(event.item.name.as_deref(), Some("Pilot"));
        assert_eq!(
            event.item.path.as_deref(),
            Some("/media/tv/show/s01e01.mkv")
        );
        assert_eq!(event.user.name.as_deref(), Some("alice"));
        assert_eq!(event.server.version.as_deref(), Some("4.8.0"));
    }

    #[test]
    fn test_empty_payload() {
        let event = NormalizedEvent::from_payload(&json!({}));

        assert_eq!(event.event_type, UNKNOWN_EVENT_TYPE);
        assert_eq!(event.item, ItemData::default());
        assert_eq!(event.user, UserData::default());
        assert_eq!(event.server, ServerData::default());
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn test_strip_empty_values_is_idempotent() {
        let mut map = Map::new();
        map.insert("a".into(), Value::Null);
        map.insert("b".into(), json!(""));
        map.insert("c".into(), json!([]));
        map.insert("d".into(), json!(0));
        map.insert("e".into(), json!(false));

        let once = strip_empty_values(map);
        let twice = strip_empty_values(once.clone());

        assert_eq!(once, twice);
        assert_eq!(
            once.keys().cloned().collect::<Vec<_>>(),
            vec!["c", "d", "e"]
        );
    }
}
