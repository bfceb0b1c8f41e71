//! In-memory order store
//!
//! Mirrors the Postgres implementation's constraints: unique order number,
//! provider order id and idempotency key, and the conditional status update.
//! All mutation happens under one write lock, so each operation is atomic.
//! Used by tests and for running the service without a database.

use crate::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use crate::database::repository::{OrderStore, StatusChange, WebhookEventLog};
use crate::database::schema::{
    IDEMPOTENCY_KEY_CONSTRAINT, ORDER_NUMBER_CONSTRAINT, PROVIDER_ORDER_ID_CONSTRAINT,
};
use crate::database::webhook_repository::{NewWebhookEvent, WebhookEvent};
use crate::orders::models::{NewOrder, Order, OrderItem, OrderReference, OrderStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    orders: BTreeMap<i64, Order>,
    items: Vec<OrderItem>,
    webhook_events: Vec<WebhookEvent>,
    next_order_id: i64,
    next_item_id: i64,
    next_event_id: i64,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    pub async fn all_orders(&self) -> Vec<Order> {
        self.tables.read().await.orders.values().cloned().collect()
    }

    /// Removes an order and, like `ON DELETE CASCADE`, its items
    pub async fn delete_order(&self, id: i64) -> bool {
        let mut tables = self.tables.write().await;
        let removed = tables.orders.remove(&id).is_some();
        tables.items.retain(|item| item.order_id != id);
        for event in tables.webhook_events.iter_mut() {
            if event.order_id == Some(id) {
                event.order_id = None;
            }
        }
        removed
    }
}

fn unique_violation(constraint: &str) -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::UniqueConstraintViolation {
        constraint: constraint.to_string(),
    })
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_pending(&self, order: &NewOrder) -> DbResult<Order> {
        let mut tables = self.tables.write().await;

        for existing in tables.orders.values() {
            if existing.order_number == order.order_number {
                return Err(unique_violation(ORDER_NUMBER_CONSTRAINT));
            }
            if existing.provider_order_id == Some(order.provider_order_id) {
                return Err(unique_violation(PROVIDER_ORDER_ID_CONSTRAINT));
            }
            if order.idempotency_key.is_some() && existing.idempotency_key == order.idempotency_key {
                return Err(unique_violation(IDEMPOTENCY_KEY_CONSTRAINT));
            }
        }

        tables.next_order_id += 1;
        let id = tables.next_order_id;
        let now = Utc::now();
        let inserted = Order {
            id,
            order_number: order.order_number.clone(),
            user_name: order.payer.name.clone(),
            user_email: order.payer.email.clone(),
            user_phone: order.payer.phone.clone(),
            delivery_address: order.payer.address.clone(),
            order_comment: order.comment.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            provider_order_id: Some(order.provider_order_id),
            provider_transaction_id: None,
            status: OrderStatus::Pending,
            payment_url: None,
            failure_reason: None,
            idempotency_key: order.idempotency_key.clone(),
            created_at: now,
            updated_at: now,
            paid_at: None,
        };

        for item in &order.items {
            tables.next_item_id += 1;
            let item_id = tables.next_item_id;
            tables.items.push(OrderItem {
                id: item_id,
                order_id: id,
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                unit_price: item.unit_price,
                quantity: item.quantity,
            });
        }
        tables.orders.insert(id, inserted.clone());

        Ok(inserted)
    }

    async fn find_by_id(&self, id: i64) -> DbResult<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn find_by_reference(&self, reference: &OrderReference) -> DbResult<Option<Order>> {
        let tables = self.tables.read().await;
        let found = tables.orders.values().find(|order| match reference {
            OrderReference::ProviderOrderId(id) => order.provider_order_id == Some(*id),
            OrderReference::OrderNumber(number) => &order.order_number == number,
        });
        Ok(found.cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> DbResult<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .find(|order| order.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn items(&self, order_id: i64) -> DbResult<Vec<OrderItem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn attach_payment_link(
        &self,
        order_id: i64,
        payment_url: &str,
        provider_transaction_id: Option<&str>,
    ) -> DbResult<Option<Order>> {
        let mut tables = self.tables.write().await;
        let Some(order) = tables.orders.get_mut(&order_id) else {
            return Ok(None);
        };
        if order.payment_url.is_some() {
            return Ok(None);
        }

        order.payment_url = Some(payment_url.to_string());
        if order.provider_transaction_id.is_none() {
            order.provider_transaction_id = provider_transaction_id.map(str::to_string);
        }
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn transition(&self, change: &StatusChange<'_>) -> DbResult<Option<Order>> {
        let mut tables = self.tables.write().await;
        let Some(order) = tables.orders.get_mut(&change.order_id) else {
            return Ok(None);
        };
        if order.status != OrderStatus::Pending {
            return Ok(None);
        }

        order.status = change.to;
        if order.provider_transaction_id.is_none() {
            order.provider_transaction_id = change.provider_transaction_id.map(str::to_string);
        }
        if let Some(reason) = change.failure_reason {
            order.failure_reason = Some(reason.to_string());
        }
        if change.to == OrderStatus::Paid {
            order.paid_at = Some(change.at);
        }
        order.updated_at = change.at;
        Ok(Some(order.clone()))
    }

    async fn health_check(&self) -> DbResult<()> {
        Ok(())
    }
}

#[async_trait]
impl WebhookEventLog for InMemoryStore {
    async fn record(&self, event: &NewWebhookEvent) -> DbResult<WebhookEvent> {
        let mut tables = self.tables.write().await;
        tables.next_event_id += 1;
        let stored = WebhookEvent {
            id: tables.next_event_id,
            provider: event.provider.clone(),
            transaction_id: event.transaction_id.clone(),
            order_reference: event.order_reference.clone(),
            transaction_status: event.transaction_status.clone(),
            payload: event.payload.clone(),
            outcome: event.outcome.clone(),
            order_id: event.order_id,
            created_at: Utc::now(),
        };
        tables.webhook_events.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_transaction(&self, transaction_id: &str) -> DbResult<Vec<WebhookEvent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .webhook_events
            .iter()
            .filter(|event| event.transaction_id == transaction_id)
            .cloned()
            .collect())
    }
}
