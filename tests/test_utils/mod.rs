//! Test utilities for database and router testing.
//!
//! Provides an in-memory SQLite database with migrations applied and a router
//! wired around caller-supplied artwork providers.

#![allow(dead_code)]

use anyhow::Result;
use axum::{Router, body::Body, http::Response};
use emby_webhooks::artwork::{ArtworkProvider, ArtworkResolver, EmbyClient};
use emby_webhooks::config::AppConfig;
use emby_webhooks::server::{AppState, create_app};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::Value;
use std::sync::Arc;

/// Sets up an in-memory SQLite database with all migrations applied.
///
/// # Returns
///
/// Returns a Result containing the database connection
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Builds the full router over a fresh database.
///
/// # Arguments
///
/// * `config` - Application configuration
/// * `providers` - Artwork chain, in priority order
///
/// # Returns
///
/// The router and the database it writes to
pub async fn test_app(
    config: AppConfig,
    providers: Vec<Arc<dyn ArtworkProvider>>,
) -> Result<(Router, DatabaseConnection)> {
    let db = setup_test_db().await?;
    let emby = Arc::new(EmbyClient::new(reqwest::Client::new(), &config.emby));
    let state = AppState::new(
        config,
        db.clone(),
        Arc::new(ArtworkResolver::new(providers)),
        emby,
    );
    Ok((create_app(state), db))
}

/// Collects a response body as JSON.
pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&bytes).expect("Response body is not JSON")
}
