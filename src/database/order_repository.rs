use crate::database::error::{DatabaseError, DbResult};
use crate::database::repository::{OrderStore, StatusChange};
use crate::database::transaction::DatabaseTransaction;
use crate::orders::models::{NewOrder, Order, OrderItem, OrderReference, OrderStatus};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

const ORDER_COLUMNS: &str = "id, order_number, user_name, user_email, user_phone, delivery_address, \
     order_comment, amount, currency, wata_order_id, wata_transaction_id, status, payment_url, \
     failure_reason, idempotency_key, created_at, updated_at, paid_at";

/// Postgres-backed order store
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn insert_pending(&self, order: &NewOrder) -> DbResult<Order> {
        let mut tx = DatabaseTransaction::begin(&self.pool).await?;

        let inserted = sqlx::query_as::<_, Order>(&format!(
            "INSERT INTO orders
                 (order_number, user_name, user_email, user_phone, delivery_address, order_comment,
                  amount, currency, wata_order_id, status, idempotency_key, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(&order.order_number)
        .bind(&order.payer.name)
        .bind(&order.payer.email)
        .bind(&order.payer.phone)
        .bind(&order.payer.address)
        .bind(&order.comment)
        .bind(order.amount)
        .bind(&order.currency)
        .bind(order.provider_order_id)
        .bind(OrderStatus::Pending)
        .bind(&order.idempotency_key)
        .fetch_one(&mut **tx.tx_mut()?)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, product_name, product_price, quantity)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(inserted.id)
            .bind(&item.product_id)
            .bind(&item.name)
            .bind(item.unit_price)
            .bind(item.quantity)
            .execute(&mut **tx.tx_mut()?)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        }

        tx.commit().await?;
        debug!(
            order_id = inserted.id,
            order_number = %inserted.order_number,
            items = order.items.len(),
            "Inserted pending order"
        );
        Ok(inserted)
    }

    async fn find_by_id(&self, id: i64) -> DbResult<Option<Order>> {
        sqlx::query_as::<_, Order>(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_reference(&self, reference: &OrderReference) -> DbResult<Option<Order>> {
        let query = match reference {
            OrderReference::ProviderOrderId(id) => {
                sqlx::query_as::<_, Order>(&format!(
                    "SELECT {} FROM orders WHERE wata_order_id = $1",
                    ORDER_COLUMNS
                ))
                .bind(*id)
                .fetch_optional(&self.pool)
                .await
            }
            OrderReference::OrderNumber(number) => {
                sqlx::query_as::<_, Order>(&format!(
                    "SELECT {} FROM orders WHERE order_number = $1",
                    ORDER_COLUMNS
                ))
                .bind(number)
                .fetch_optional(&self.pool)
                .await
            }
        };
        query.map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> DbResult<Option<Order>> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE idempotency_key = $1",
            ORDER_COLUMNS
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn items(&self, order_id: i64) -> DbResult<Vec<OrderItem>> {
        sqlx::query_as::<_, OrderItem>(
            "SELECT id, order_id, product_id, product_name, product_price, quantity
             FROM order_items WHERE order_id = $1 ORDER BY id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn attach_payment_link(
        &self,
        order_id: i64,
        payment_url: &str,
        provider_transaction_id: Option<&str>,
    ) -> DbResult<Option<Order>> {
        sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders
             SET payment_url = $2,
                 wata_transaction_id = COALESCE(wata_transaction_id, $3),
                 updated_at = NOW()
             WHERE id = $1 AND payment_url IS NULL
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(payment_url)
        .bind(provider_transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn transition(&self, change: &StatusChange<'_>) -> DbResult<Option<Order>> {
        // Single statement; the status predicate makes concurrent deliveries race-free
        sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders
             SET status = $2,
                 wata_transaction_id = COALESCE(wata_transaction_id, $3),
                 failure_reason = COALESCE($4, failure_reason),
                 paid_at = CASE WHEN $2 = 'paid'::order_status THEN $5 ELSE paid_at END,
                 updated_at = $5
             WHERE id = $1 AND status = 'pending'
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(change.order_id)
        .bind(change.to)
        .bind(change.provider_transaction_id)
        .bind(change.failure_reason)
        .bind(change.at)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn health_check(&self) -> DbResult<()> {
        crate::database::health_check(&self.pool).await
    }
}
