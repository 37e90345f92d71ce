//! # Error Handling
//!
//! Unified error handling for the dashboard API (problem+json with trace IDs),
//! repository errors, and the webhook ingestion pipeline.

use std::any::Any;

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            trace_id: Self::current_trace_id(),
        }
    }

    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, Json(self)).into_response()
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

/// Errors surfaced by repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl RepositoryError {
    /// Wrap a database error, logging it at the call site.
    pub fn database_error(error: sea_orm::DbErr) -> Self {
        tracing::error!(error = %error, "repository database error");
        Self::Database(error)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(db_err) => db_err.into(),
            RepositoryError::Validation(msg) => Self::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                &format!("Validation failed: {}", msg),
            ),
        }
    }
}

/// Failures inside the webhook ingestion pipeline.
///
/// Provider failures never reach this type; they degrade to "no artwork".
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read webhook body: {0}")]
    Body(String),
    #[error("failed to persist webhook event: {0}")]
    Persist(#[from] RepositoryError),
}

/// Status envelope returned to the media server by the webhook endpoint.
///
/// The webhook caller expects `{status, message}` rather than problem+json.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookStatus {
    /// `success` or `error`
    #[schema(example = "success")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookStatus {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
        }
    }
}

/// Webhook rejection responses.
#[derive(Debug)]
pub enum WebhookError {
    Unauthorized,
    Internal(IngestError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(WebhookStatus::error("Unauthorized")),
            )
                .into_response(),
            WebhookError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookStatus::error(err.to_string())),
            )
                .into_response(),
        }
    }
}

impl From<IngestError> for WebhookError {
    fn from(error: IngestError) -> Self {
        WebhookError::Internal(error)
    }
}

/// Create a not found error (404)
pub fn not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

/// Answers a request whose handler panicked, in the webhook envelope.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(WebhookStatus::error("Internal server error")),
    )
        .into_response()
}
