//! # API Handlers
//!
//! HTTP endpoint handlers: the webhook receiver, the dashboard views and the
//! health probe.

pub mod dashboard;
pub mod health;
pub mod types;
pub mod webhooks;

pub use dashboard::{list_webhooks, show_webhook};
pub use health::health;
pub use webhooks::receive_webhook;
