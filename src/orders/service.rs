//! Payment creation
//!
//! Persists a `pending` order, asks the provider for a payment link and
//! attaches it. A provider failure leaves the order `pending` with no link
//! and is reported to the caller, who may retry with the same idempotency key.

use crate::config::CheckoutConfig;
use crate::database::repository::OrderStore;
use crate::database::schema::{
    IDEMPOTENCY_KEY_CONSTRAINT, ORDER_NUMBER_CONSTRAINT, PROVIDER_ORDER_ID_CONSTRAINT,
};
use crate::error::{AppError, AppResult, ConflictError, InfrastructureError};
use crate::orders::models::{Order, OrderIdentifiers, OrderStatus};
use crate::orders::validation::{CheckoutDraft, RedirectUrls};
use crate::payments::traits::PaymentProvider;
use crate::payments::types::PaymentLinkRequest;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Attempts at finding an unused order number / provider order id
pub const MAX_IDENTIFIER_ATTEMPTS: u32 = 10;

/// Response body of `POST /wata`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentCreated {
    pub payment_url: String,
    pub order_id: i64,
    pub order_number: String,
    pub wata_transaction_id: Option<String>,
}

impl PaymentCreated {
    fn from_order(order: &Order, payment_url: String) -> Self {
        Self {
            payment_url,
            order_id: order.id,
            order_number: order.order_number.clone(),
            wata_transaction_id: order.provider_transaction_id.clone(),
        }
    }
}

pub struct CheckoutService {
    orders: Arc<dyn OrderStore>,
    provider: Arc<dyn PaymentProvider>,
    currency: String,
    order_number_prefix: String,
    idempotency_window: Duration,
}

impl CheckoutService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        provider: Arc<dyn PaymentProvider>,
        config: &CheckoutConfig,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            orders,
            provider,
            currency: currency.into(),
            order_number_prefix: config.order_number_prefix.clone(),
            idempotency_window: Duration::hours(config.idempotency_window_hours),
        }
    }

    pub async fn create_payment(&self, draft: CheckoutDraft) -> AppResult<PaymentCreated> {
        if let Some(key) = &draft.idempotency_key {
            if let Some(existing) = self.orders.find_by_idempotency_key(key).await? {
                return self.replay(existing, &draft).await;
            }
        }

        let order = match self.insert(&draft).await? {
            Inserted::New(order) => order,
            Inserted::Existing(order) => return self.replay(order, &draft).await,
        };

        info!(
            order_id = order.id,
            order_number = %order.order_number,
            amount = %order.amount,
            "Order created"
        );

        self.request_link(order, &draft.redirects).await
    }

    /// Insert with fresh identifiers, retrying on identifier collisions
    async fn insert(&self, draft: &CheckoutDraft) -> AppResult<Inserted> {
        for attempt in 1..=MAX_IDENTIFIER_ATTEMPTS {
            let ids = OrderIdentifiers::generate(&self.order_number_prefix, Utc::now());
            let new_order = draft.into_new_order(ids, &self.currency);

            let err = match self.orders.insert_pending(&new_order).await {
                Ok(order) => return Ok(Inserted::New(order)),
                Err(err) => err,
            };

            let constraint = err.unique_violation().map(str::to_owned);
            match constraint.as_deref() {
                Some(IDEMPOTENCY_KEY_CONSTRAINT) => {
                    // A concurrent request with the same key got there first
                    if let Some(key) = &draft.idempotency_key {
                        if let Some(existing) = self.orders.find_by_idempotency_key(key).await? {
                            return Ok(Inserted::Existing(existing));
                        }
                    }
                    return Err(err.into());
                }
                Some(ORDER_NUMBER_CONSTRAINT) | Some(PROVIDER_ORDER_ID_CONSTRAINT) => {
                    warn!(attempt, order_number = %new_order.order_number, "Order identifier collision, retrying");
                }
                _ => return Err(err.into()),
            }
        }

        Err(InfrastructureError::IdentifierExhausted {
            attempts: MAX_IDENTIFIER_ATTEMPTS,
        }
        .into())
    }

    /// Answer a repeated idempotency key from the order it created
    async fn replay(&self, existing: Order, draft: &CheckoutDraft) -> AppResult<PaymentCreated> {
        let key = existing.idempotency_key.clone().unwrap_or_default();

        if existing.amount != draft.amount || !existing.user_email.eq_ignore_ascii_case(&draft.payer.email) {
            return Err(ConflictError::IdempotencyKeyMismatch { key }.into());
        }
        if existing.created_at + self.idempotency_window < Utc::now() {
            return Err(ConflictError::IdempotencyKeyExpired { key }.into());
        }

        info!(order_number = %existing.order_number, "Idempotent replay");

        if let Some(url) = existing.payment_url.clone() {
            return Ok(PaymentCreated::from_order(&existing, url));
        }
        if existing.status != OrderStatus::Pending {
            return Err(ConflictError::OrderClosed {
                order_number: existing.order_number.clone(),
                status: existing.status.to_string(),
            }
            .into());
        }

        self.request_link(existing, &draft.redirects).await
    }

    async fn request_link(&self, order: Order, redirects: &RedirectUrls) -> AppResult<PaymentCreated> {
        let request = PaymentLinkRequest::for_order(&order, redirects).ok_or_else(|| {
            AppError::from(InfrastructureError::MissingProviderReference {
                order_number: order.order_number.clone(),
            })
        })?;

        let link = match self.provider.request_payment_link(request).await {
            Ok(link) => link,
            Err(err) => {
                warn!(
                    order_number = %order.order_number,
                    provider = self.provider.name(),
                    error = %err,
                    "Payment link request failed, order left pending"
                );
                return Err(err.with_context(format!("order {}", order.order_number)));
            }
        };

        let stored = match self
            .orders
            .attach_payment_link(order.id, &link.url, link.provider_transaction_id.as_deref())
            .await?
        {
            Some(updated) => updated,
            // A concurrent replay attached its link first; report the stored one
            None => self.orders.find_by_id(order.id).await?.unwrap_or(order),
        };

        let payment_url = stored.payment_url.clone().unwrap_or(link.url);
        info!(
            order_number = %stored.order_number,
            transaction_id = stored.provider_transaction_id.as_deref().unwrap_or("-"),
            "Payment link attached"
        );
        Ok(PaymentCreated::from_order(&stored, payment_url))
    }
}

enum Inserted {
    New(Order),
    Existing(Order),
}
