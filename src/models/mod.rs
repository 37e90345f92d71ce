//! # Data Models
//!
//! This module contains all the data models used throughout the Emby webhooks service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod cache_entry;
pub mod webhook_event;

pub use cache_entry::Entity as CacheEntry;
pub use webhook_event::Entity as WebhookEvent;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "emby-webhooks".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
