use crate::database::error::DbResult;
use crate::database::webhook_repository::{NewWebhookEvent, WebhookEvent};
use crate::orders::models::{NewOrder, Order, OrderItem, OrderReference, OrderStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A forward status transition, applied only while the order is still `pending`
#[derive(Debug, Clone)]
pub struct StatusChange<'a> {
    pub order_id: i64,
    pub to: OrderStatus,
    /// Stored only if the order has none yet
    pub provider_transaction_id: Option<&'a str>,
    pub failure_reason: Option<&'a str>,
    pub at: DateTime<Utc>,
}

/// Durable record of orders and their line items
///
/// Every status write goes through [`OrderStore::transition`], which is a
/// compare-and-set on `status = 'pending'`: it either applies completely and
/// returns the updated order, or changes nothing and returns `None`.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert an order in `pending` status together with its items, atomically
    async fn insert_pending(&self, order: &NewOrder) -> DbResult<Order>;

    async fn find_by_id(&self, id: i64) -> DbResult<Option<Order>>;

    async fn find_by_reference(&self, reference: &OrderReference) -> DbResult<Option<Order>>;

    async fn find_by_idempotency_key(&self, key: &str) -> DbResult<Option<Order>>;

    async fn items(&self, order_id: i64) -> DbResult<Vec<OrderItem>>;

    /// Set the payment link once. `None` if the order already has one.
    async fn attach_payment_link(
        &self,
        order_id: i64,
        payment_url: &str,
        provider_transaction_id: Option<&str>,
    ) -> DbResult<Option<Order>>;

    /// Conditional update from `pending`. `None` if the order is no longer pending.
    async fn transition(&self, change: &StatusChange<'_>) -> DbResult<Option<Order>>;

    async fn health_check(&self) -> DbResult<()>;
}

/// Audit trail of verified provider notifications
#[async_trait]
pub trait WebhookEventLog: Send + Sync {
    async fn record(&self, event: &NewWebhookEvent) -> DbResult<WebhookEvent>;

    async fn find_by_transaction(&self, transaction_id: &str) -> DbResult<Vec<WebhookEvent>>;
}
