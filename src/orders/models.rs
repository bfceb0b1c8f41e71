//! Order and order item records plus the values used to create them

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Order status. `Paid` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order entity
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub user_name: String,
    pub user_email: String,
    pub user_phone: String,
    pub delivery_address: Option<String>,
    pub order_comment: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    /// Reference we hand the provider as its `orderId`
    #[sqlx(rename = "wata_order_id")]
    pub provider_order_id: Option<i64>,
    #[sqlx(rename = "wata_transaction_id")]
    pub provider_transaction_id: Option<String>,
    pub status: OrderStatus,
    pub payment_url: Option<String>,
    pub failure_reason: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Line item owned by exactly one order
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: String,
    #[sqlx(rename = "product_name")]
    pub name: String,
    #[sqlx(rename = "product_price")]
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// Validated payer identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payer {
    pub name: String,
    pub email: String,
    /// Digits only, always 11 of them
    pub phone: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl NewOrderItem {
    /// `None` on overflow
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// A validated order ready to be persisted in `pending` status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub order_number: String,
    pub provider_order_id: i64,
    pub payer: Payer,
    pub comment: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub idempotency_key: Option<String>,
    pub items: Vec<NewOrderItem>,
}

pub const PROVIDER_ORDER_ID_MIN: i64 = 100_000;
pub const PROVIDER_ORDER_ID_MAX: i64 = 2_147_483_647;

/// Externally visible identifiers assigned at creation time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderIdentifiers {
    pub order_number: String,
    pub provider_order_id: i64,
}

impl OrderIdentifiers {
    /// `<prefix>-YYYYMMDD-<provider order id>` with a random provider order id
    pub fn generate(prefix: &str, now: DateTime<Utc>) -> Self {
        let provider_order_id =
            rand::thread_rng().gen_range(PROVIDER_ORDER_ID_MIN..=PROVIDER_ORDER_ID_MAX);
        Self::from_parts(prefix, now, provider_order_id)
    }

    pub fn from_parts(prefix: &str, now: DateTime<Utc>, provider_order_id: i64) -> Self {
        Self {
            order_number: format!("{}-{}-{}", prefix, now.format("%Y%m%d"), provider_order_id),
            provider_order_id,
        }
    }
}

/// How a webhook names the order it is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderReference {
    ProviderOrderId(i64),
    OrderNumber(String),
}

impl OrderReference {
    /// Numeric references are provider order ids; anything else is an order number
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<i64>() {
            Ok(id) => Some(OrderReference::ProviderOrderId(id)),
            Err(_) => Some(OrderReference::OrderNumber(raw.to_string())),
        }
    }
}

impl fmt::Display for OrderReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderReference::ProviderOrderId(id) => write!(f, "{}", id),
            OrderReference::OrderNumber(number) => f.write_str(number),
        }
    }
}
