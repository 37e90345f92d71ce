//! # Dashboard Handlers
//!
//! Read-only views over stored webhook events: a paginated list, newest
//! first, and a detail view addressed by public id.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::error::{ApiError, not_found};
use crate::handlers::types::{DashboardPage, WebhookDetail};
use crate::repositories::WebhookEventRepository;
use crate::server::AppState;

/// Query parameters for the dashboard list
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DashboardQuery {
    /// 1-based page number; zero or out-of-range pages show page 1
    pub page: Option<u64>,
}

/// List stored webhook events
#[utoipa::path(
    get,
    path = "/",
    params(DashboardQuery),
    responses(
        (status = 200, description = "Page of webhook events, newest first", body = DashboardPage),
        (status = 503, description = "Database unavailable", body = ApiError, example = json!({
            "code": "SERVICE_UNAVAILABLE",
            "message": "Database service unavailable",
            "trace_id": "corr-55555555"
        }))
    ),
    tag = "dashboard"
)]
pub async fn list_webhooks(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardPage>, ApiError> {
    let dashboard = &state.config.dashboard;
    let page = WebhookEventRepository::new(&state.db)
        .paginate(query.page.unwrap_or(1), dashboard.per_page)
        .await?;

    debug!(
        page = page.page,
        last_page = page.last_page,
        total = page.total,
        "Dashboard page loaded"
    );

    Ok(Json(DashboardPage::new(page, dashboard, Utc::now())))
}

/// Show a single webhook event
#[utoipa::path(
    get,
    path = "/webhook/{public_id}",
    params(
        ("public_id" = String, Path, description = "Public identifier of the event")
    ),
    responses(
        (status = 200, description = "Webhook event detail", body = WebhookDetail),
        (status = 404, description = "No event with this id", body = ApiError, example = json!({
            "code": "NOT_FOUND",
            "message": "Webhook event not found",
            "trace_id": "corr-12345678"
        }))
    ),
    tag = "dashboard"
)]
pub async fn show_webhook(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> Result<Json<WebhookDetail>, ApiError> {
    // Malformed ids cannot exist, so they read as missing rather than invalid
    let public_id =
        Uuid::parse_str(&public_id).map_err(|_| not_found("Webhook event not found"))?;

    let event = WebhookEventRepository::new(&state.db)
        .find_by_public_id(public_id)
        .await?
        .ok_or_else(|| not_found("Webhook event not found"))?;

    Ok(Json(WebhookDetail::from_model(
        event,
        &state.config.dashboard,
        Utc::now(),
    )))
}
