//! # Health Endpoint
//!
//! Reports database connectivity and whether the media server answers.

use axum::{extract::State, http::StatusCode, response::Json};
use tracing::warn;

use crate::db;
use crate::handlers::types::HealthResponse;
use crate::models::ServiceInfo;
use crate::server::AppState;

/// Service health
///
/// Returns 503 when the database is unreachable. An unreachable media server
/// only degrades artwork, so it is reported but never fails the probe.
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match db::health_check(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            false
        }
    };
    let emby_reachable = state.emby.verify_connection().await;

    let ServiceInfo { service, version } = ServiceInfo::default();
    let (status_code, status) = if database {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(HealthResponse {
            service,
            version,
            status: status.to_string(),
            database,
            emby_reachable,
        }),
    )
}
