//! # Server Configuration
//!
//! Router assembly, shared application state and the serve loop for the
//! Emby webhooks service.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::artwork::{ArtworkResolver, EmbyClient, TmdbClient, TvdbClient, build_http_client};
use crate::cache::build_token_cache;
use crate::config::AppConfig;
use crate::error::panic_response;
use crate::handlers;
use crate::ingestion::WebhookIngestor;
use crate::telemetry::trace_id_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub ingestor: WebhookIngestor,
    /// Media server client, also used by the health probe
    pub emby: Arc<EmbyClient>,
}

impl AppState {
    /// Wires provider clients, the token cache and the ingestion pipeline.
    pub fn build(config: AppConfig, db: DatabaseConnection) -> Result<Self, reqwest::Error> {
        let http = build_http_client(config.provider_timeout())?;
        let token_cache = build_token_cache(config.token_cache_backend, &db);

        let emby = Arc::new(EmbyClient::new(http.clone(), &config.emby));
        let tvdb = Arc::new(TvdbClient::new(http.clone(), &config.tvdb, token_cache));
        let tmdb = Arc::new(TmdbClient::new(http, &config.tmdb));
        let resolver = Arc::new(ArtworkResolver::with_default_chain(
            Arc::clone(&emby),
            tvdb,
            tmdb,
        ));

        info!(
            providers = ?resolver.provider_names(),
            token_cache = ?config.token_cache_backend,
            "Artwork resolution chain ready"
        );

        Ok(Self::new(config, db, resolver, emby))
    }

    /// Assembles state around an existing resolver.
    pub fn new(
        config: AppConfig,
        db: DatabaseConnection,
        resolver: Arc<ArtworkResolver>,
        emby: Arc<EmbyClient>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            ingestor: WebhookIngestor::new(db.clone(), resolver),
            db,
            emby,
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(handlers::list_webhooks))
        .route("/webhook/{public_id}", get(handlers::show_webhook))
        .route("/emby/webhook", post(handlers::receive_webhook))
        .route("/healthz", get(handlers::health))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()));

    with_middleware(routes)
}

/// Shared middleware stack. A panicking handler answers 500 instead of
/// dropping the connection.
fn with_middleware(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(axum::middleware::from_fn(trace_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState::build(config, db)?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, %profile, "Server listening");

    // Connect info feeds the caller IP into unauthorized-webhook warnings
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::webhooks::receive_webhook,
        crate::handlers::dashboard::list_webhooks,
        crate::handlers::dashboard::show_webhook,
        crate::handlers::health::health,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::error::WebhookStatus,
            crate::handlers::types::DashboardPage,
            crate::handlers::types::WebhookCard,
            crate::handlers::types::WebhookDetail,
            crate::handlers::types::EventSource,
            crate::handlers::types::DisplayFlags,
            crate::handlers::types::HealthResponse,
        )
    ),
    tags(
        (name = "webhooks", description = "Media server webhook intake"),
        (name = "dashboard", description = "Browse stored webhook events"),
        (name = "health", description = "Service health"),
    ),
    info(
        title = "Emby Webhooks API",
        description = "Receives Emby webhooks, resolves cover art and serves a dashboard of stored events",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
