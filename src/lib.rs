//! # Emby Webhooks Library
//!
//! Receives media-server webhooks, resolves cover art through a chain of
//! external providers, stores the enriched events and serves them back as a
//! paginated dashboard.

pub mod artwork;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ingestion;
pub mod models;
pub mod normalization;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub use migration;
