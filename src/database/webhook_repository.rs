use crate::database::error::{DatabaseError, DbResult};
use crate::database::repository::WebhookEventLog;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

/// Webhook event entity
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookEvent {
    pub id: i64,
    pub provider: String,
    pub transaction_id: String,
    pub order_reference: String,
    pub transaction_status: String,
    pub payload: serde_json::Value,
    /// `applied`, `duplicate`, or the rejection reason
    pub outcome: String,
    pub order_id: Option<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub provider: String,
    pub transaction_id: String,
    pub order_reference: String,
    pub transaction_status: String,
    pub payload: serde_json::Value,
    pub outcome: String,
    pub order_id: Option<i64>,
}

const WEBHOOK_EVENT_COLUMNS: &str = "id, provider, transaction_id, order_reference, transaction_status, \
     payload, outcome, order_id, created_at";

/// Webhook Repository for webhook event storage and tracking
pub struct WebhookRepository {
    pool: PgPool,
}

impl WebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventLog for WebhookRepository {
    async fn record(&self, event: &NewWebhookEvent) -> DbResult<WebhookEvent> {
        sqlx::query_as::<_, WebhookEvent>(&format!(
            "INSERT INTO webhook_events
                 (provider, transaction_id, order_reference, transaction_status, payload, outcome, order_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
             RETURNING {}",
            WEBHOOK_EVENT_COLUMNS
        ))
        .bind(&event.provider)
        .bind(&event.transaction_id)
        .bind(&event.order_reference)
        .bind(&event.transaction_status)
        .bind(&event.payload)
        .bind(&event.outcome)
        .bind(event.order_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_transaction(&self, transaction_id: &str) -> DbResult<Vec<WebhookEvent>> {
        sqlx::query_as::<_, WebhookEvent>(&format!(
            "SELECT {} FROM webhook_events WHERE transaction_id = $1 ORDER BY id ASC",
            WEBHOOK_EVENT_COLUMNS
        ))
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
