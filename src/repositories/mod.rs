//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for the
//! stored webhook events.

pub mod webhook_event;

pub use webhook_event::{NewWebhookEvent, WebhookEventPage, WebhookEventRepository};
