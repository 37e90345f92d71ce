//! # Webhook Event Repository
//!
//! Create and read access to stored webhook events. Events are immutable once
//! written, so there is no update or delete.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::webhook_event::{self, Entity as WebhookEvent, Model};
use crate::normalization::{ItemData, strip_empty_values};

/// Fully populated event awaiting insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWebhookEvent {
    pub event_type: String,
    pub item_type: Option<String>,
    pub item_name: Option<String>,
    pub item_path: Option<String>,
    pub user_name: Option<String>,
    pub server_name: Option<String>,
    pub metadata: Map<String, Value>,
    pub raw_payload: Value,
    pub created_at: DateTime<Utc>,
}

impl NewWebhookEvent {
    /// Starts an event received now with empty metadata.
    pub fn new(event_type: impl Into<String>, raw_payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            item_type: None,
            item_name: None,
            item_path: None,
            user_name: None,
            server_name: None,
            metadata: Map::new(),
            raw_payload,
            created_at: Utc::now(),
        }
    }

    pub fn with_item(mut self, item: &ItemData) -> Self {
        self.item_type = item.item_type.clone();
        self.item_name = item.name.clone();
        self.item_path = item.path.clone();
        self
    }

    pub fn with_user_name(mut self, user_name: Option<String>) -> Self {
        self.user_name = user_name;
        self
    }

    pub fn with_server_name(mut self, server_name: Option<String>) -> Self {
        self.server_name = server_name;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// One page of events, newest first.
#[derive(Debug, Clone)]
pub struct WebhookEventPage {
    pub items: Vec<Model>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub last_page: u64,
}

impl WebhookEventPage {
    pub fn has_more(&self) -> bool {
        self.page < self.last_page
    }
}

/// Repository for webhook event database operations
pub struct WebhookEventRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> WebhookEventRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts a new event with a freshly generated public id.
    ///
    /// # Arguments
    /// * `event` - Event to persist; null and empty-string metadata values are dropped
    ///
    /// # Returns
    /// The stored model
    pub async fn create(&self, event: NewWebhookEvent) -> Result<Model, RepositoryError> {
        let active = webhook_event::ActiveModel {
            public_id: Set(Uuid::new_v4()),
            event_type: Set(event.event_type),
            item_type: Set(event.item_type),
            item_name: Set(event.item_name),
            item_path: Set(event.item_path),
            user_name: Set(event.user_name),
            server_name: Set(event.server_name),
            metadata: Set(Value::Object(strip_empty_values(event.metadata))),
            raw_payload: Set(event.raw_payload),
            created_at: Set(event.created_at.fixed_offset()),
            ..Default::default()
        };

        active
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Looks an event up by its public id.
    pub async fn find_by_public_id(&self, public_id: Uuid) -> Result<Option<Model>, RepositoryError> {
        WebhookEvent::find()
            .filter(webhook_event::Column::PublicId.eq(public_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Fetches one page ordered by created_at DESC, id DESC.
    ///
    /// # Arguments
    /// * `page` - 1-based page number; zero or past-the-end pages fall back to page 1
    /// * `per_page` - Page size, must be positive
    ///
    /// # Returns
    /// The page plus totals for building navigation
    pub async fn paginate(&self, page: u64, per_page: u64) -> Result<WebhookEventPage, RepositoryError> {
        if per_page == 0 {
            return Err(RepositoryError::Validation(
                "per_page must be positive".to_string(),
            ));
        }

        let paginator = WebhookEvent::find()
            .order_by_desc(webhook_event::Column::CreatedAt)
            .order_by_desc(webhook_event::Column::Id)
            .paginate(self.db, per_page);

        let totals = paginator
            .num_items_and_pages()
            .await
            .map_err(RepositoryError::database_error)?;
        let last_page = totals.number_of_pages.max(1);
        let page = if page == 0 || page > last_page { 1 } else { page };

        let items = paginator
            .fetch_page(page - 1)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(WebhookEventPage {
            items,
            page,
            per_page,
            total: totals.number_of_items,
            last_page,
        })
    }
}
