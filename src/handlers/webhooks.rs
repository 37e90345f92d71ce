//! # Webhook Receiver
//!
//! Entry point for media-server notifications. The endpoint always answers
//! with a `{status, message}` body because the media server logs it verbatim.

use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, Query, Request, State},
    http::HeaderMap,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};
use utoipa::IntoParams;

use crate::error::{IngestError, WebhookError, WebhookStatus};
use crate::server::AppState;

/// Largest accepted payload. Emby item payloads are a few kilobytes.
const MAX_WEBHOOK_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Query parameters accepted by the webhook endpoint
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WebhookQuery {
    /// Shared secret; required when the service has one configured
    pub secret: Option<String>,
}

impl WebhookQuery {
    /// Builds the query from raw pairs. Repeated keys never reject the
    /// request; the first `secret` wins and unknown keys are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let secret = pairs
            .into_iter()
            .find(|(key, _)| key == "secret")
            .map(|(_, value)| value);
        Self { secret }
    }
}

/// Receive a media-server webhook
///
/// Normalizes the payload, resolves cover art for newly added items and stores
/// the event. An empty or malformed body is stored as `{}`.
#[utoipa::path(
    post,
    path = "/emby/webhook",
    params(WebhookQuery),
    request_body(content = Option<JsonValue>, description = "Emby webhook payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Event stored", body = WebhookStatus,
         example = json!({"status": "success"})),
        (status = 401, description = "Missing or wrong secret", body = WebhookStatus,
         example = json!({"status": "error", "message": "Unauthorized"})),
        (status = 500, description = "Body unreadable or over 2 MiB, or the event could not be stored", body = WebhookStatus,
         example = json!({"status": "error", "message": "failed to read webhook body: length limit exceeded"}))
    ),
    tag = "webhooks"
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
    req: Request,
) -> Result<Json<WebhookStatus>, WebhookError> {
    let query = WebhookQuery::from_pairs(pairs);
    if !secret_matches(
        state.config.webhook_secret.as_deref(),
        query.secret.as_deref(),
    ) {
        let socket = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        warn!(
            client_ip = %client_ip(req.headers(), socket),
            "Unauthorized webhook attempt"
        );
        return Err(WebhookError::Unauthorized);
    }

    let bytes = axum::body::to_bytes(req.into_body(), MAX_WEBHOOK_BODY_BYTES)
        .await
        .map_err(|e| {
            error!(error = %e, limit = MAX_WEBHOOK_BODY_BYTES, "Failed to read webhook body");
            IngestError::Body(e.to_string())
        })?;
    let payload = parse_payload(&bytes);

    debug!(payload = %payload, "Webhook received");

    match state.ingestor.ingest(payload.clone()).await {
        Ok(event) => {
            info!(
                public_id = %event.public_id,
                event_type = %event.event_type,
                "Webhook processed"
            );
            Ok(Json(WebhookStatus::success()))
        }
        Err(e) => {
            error!(error = %e, payload = %payload, "Error processing webhook");
            Err(e.into())
        }
    }
}

/// Constant-time secret check. No configured secret accepts everything.
pub fn secret_matches(expected: Option<&str>, provided: Option<&str>) -> bool {
    match (expected, provided) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(expected), Some(provided)) => expected.as_bytes().ct_eq(provided.as_bytes()).into(),
    }
}

/// Caller address for audit logs, preferring the first `X-Forwarded-For` hop.
fn client_ip(headers: &HeaderMap, socket: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| socket.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses the body, substituting `{}` for empty or non-JSON input.
fn parse_payload(bytes: &[u8]) -> JsonValue {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return JsonValue::Object(Default::default());
    }

    match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Webhook body is not valid JSON, storing empty payload");
            JsonValue::Object(Default::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_secret_matches() {
        assert!(secret_matches(None, None));
        assert!(secret_matches(None, Some("anything")));
        assert!(secret_matches(Some("s3cret"), Some("s3cret")));
        assert!(!secret_matches(Some("s3cret"), Some("wrong")));
        assert!(!secret_matches(Some("s3cret"), Some("s3cret-longer")));
        assert!(!secret_matches(Some("s3cret"), None));
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let socket: SocketAddr = "10.0.0.5:4321".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(socket)), "10.0.0.5");
        assert_eq!(client_ip(&headers, None), "unknown");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, Some(socket)), "203.0.113.9");
    }

    #[test]
    fn test_query_from_pairs_keeps_first_secret() {
        let query = WebhookQuery::from_pairs(vec![
            ("page".to_string(), "2".to_string()),
            ("secret".to_string(), "first".to_string()),
            ("secret".to_string(), "second".to_string()),
        ]);
        assert_eq!(query.secret.as_deref(), Some("first"));

        assert!(WebhookQuery::from_pairs(vec![]).secret.is_none());
    }

    #[test]
    fn test_parse_payload_fallbacks() {
        assert_eq!(parse_payload(b""), json!({}));
        assert_eq!(parse_payload(b"  \n"), json!({}));
        assert_eq!(parse_payload(b"not json"), json!({}));
        assert_eq!(
            parse_payload(br#"{"Event":"library.new"}"#),
            json!({"Event": "library.new"})
        );
    }
}
