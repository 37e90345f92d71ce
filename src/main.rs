//! # Emby Webhooks Main Entry Point
//!
//! Loads configuration, prepares the database and starts the HTTP server.

use emby_webhooks::{config::ConfigLoader, db, server::run_server, telemetry};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    telemetry::init_tracing(&config)?;

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        info!(config = %redacted_json, "Effective configuration");
    }

    let db = db::init_pool(&config).await?;
    db::run_migrations(&db).await?;

    // Start the server with the loaded configuration
    run_server(config, db).await
}
