//! Order Lifecycle Engine
//!
//! The only writer of order status. `pending` moves to `paid` or `failed`
//! exactly once; both are terminal. Each transition is a single conditional
//! update in the store, so concurrent deliveries for the same order cannot
//! both win.

use crate::database::repository::{OrderStore, StatusChange};
use crate::error::{AppResult, WebhookError};
use crate::orders::models::{Order, OrderReference, OrderStatus};
use crate::payments::signature::VerifiedWebhook;
use crate::payments::types::WebhookNotification;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Settlement outcome reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid,
    Failed,
}

impl PaymentOutcome {
    /// Case-insensitive; `None` for anything outside the known vocabulary
    pub fn from_provider_status(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "success" | "completed" | "paid" => Some(PaymentOutcome::Paid),
            "failed" | "error" | "rejected" => Some(PaymentOutcome::Failed),
            _ => None,
        }
    }

    pub fn target_status(self) -> OrderStatus {
        match self {
            PaymentOutcome::Paid => OrderStatus::Paid,
            PaymentOutcome::Failed => OrderStatus::Failed,
        }
    }
}

/// What a verified webhook did to its order
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// This delivery moved the order out of `pending`
    Applied(Order),
    /// The order was already terminal; nothing was written
    Duplicate(Order),
}

impl TransitionResult {
    pub fn order(&self) -> &Order {
        match self {
            TransitionResult::Applied(order) | TransitionResult::Duplicate(order) => order,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransitionResult::Applied(_) => "applied",
            TransitionResult::Duplicate(_) => "duplicate",
        }
    }
}

pub struct OrderLifecycle {
    store: Arc<dyn OrderStore>,
}

impl OrderLifecycle {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Apply a verified provider notification to its order
    pub async fn apply(&self, webhook: &VerifiedWebhook) -> AppResult<TransitionResult> {
        let notification = webhook.notification();

        let reference = OrderReference::parse(&notification.order_id).ok_or_else(|| {
            WebhookError::MalformedPayload {
                message: "orderId must not be empty".to_string(),
            }
        })?;

        let Some(order) = self.store.find_by_reference(&reference).await? else {
            error!(
                order_reference = %reference,
                transaction_id = %notification.transaction_id,
                "Webhook for unknown order"
            );
            return Err(WebhookError::UnknownOrder {
                reference: reference.to_string(),
            }
            .into());
        };

        let Some(outcome) = PaymentOutcome::from_provider_status(&notification.transaction_status) else {
            error!(
                order_number = %order.order_number,
                transaction_status = %notification.transaction_status,
                "Unrecognized transaction status, order left unchanged"
            );
            return Err(WebhookError::UnrecognizedOutcome {
                status: notification.transaction_status.clone(),
            }
            .into());
        };

        if order.status.is_terminal() {
            return Ok(self.duplicate(order, outcome));
        }

        if outcome == PaymentOutcome::Paid {
            check_settlement(&order, notification)?;
        }

        let failure_reason = match outcome {
            PaymentOutcome::Failed => notification.failure_reason(),
            PaymentOutcome::Paid => None,
        };
        let change = StatusChange {
            order_id: order.id,
            to: outcome.target_status(),
            provider_transaction_id: Some(notification.transaction_id.as_str()),
            failure_reason: failure_reason.as_deref(),
            at: Utc::now(),
        };

        match self.store.transition(&change).await? {
            Some(updated) => {
                info!(
                    order_number = %updated.order_number,
                    status = %updated.status,
                    transaction_id = %notification.transaction_id,
                    transaction_type = notification.transaction_type.as_deref().unwrap_or("-"),
                    payment_time = notification.payment_time.as_deref().unwrap_or("-"),
                    commission = ?notification.commission,
                    payer_email = notification.email.as_deref().unwrap_or("-"),
                    "Order transitioned"
                );
                Ok(TransitionResult::Applied(updated))
            }
            None => {
                // Another delivery won the compare-and-set between our read and write
                let current = self.store.find_by_id(order.id).await?.ok_or_else(|| {
                    WebhookError::UnknownOrder {
                        reference: reference.to_string(),
                    }
                })?;
                Ok(self.duplicate(current, outcome))
            }
        }
    }

    fn duplicate(&self, order: Order, outcome: PaymentOutcome) -> TransitionResult {
        if order.status == outcome.target_status() {
            info!(
                order_number = %order.order_number,
                status = %order.status,
                "Duplicate webhook acknowledged"
            );
        } else {
            warn!(
                order_number = %order.order_number,
                status = %order.status,
                reported = ?outcome,
                "Conflicting webhook for terminal order ignored"
            );
        }
        TransitionResult::Duplicate(order)
    }
}

/// A success report must match what the order asked for
fn check_settlement(order: &Order, notification: &WebhookNotification) -> Result<(), WebhookError> {
    if notification.amount.round_dp(2) != order.amount.round_dp(2) {
        error!(
            order_number = %order.order_number,
            reported = %notification.amount,
            expected = %order.amount,
            "Webhook amount does not match order"
        );
        return Err(WebhookError::AmountMismatch {
            field: "amount",
            reported: notification.amount.to_string(),
            expected: order.amount.to_string(),
        });
    }

    if !notification.currency.trim().eq_ignore_ascii_case(&order.currency) {
        error!(
            order_number = %order.order_number,
            reported = %notification.currency,
            expected = %order.currency,
            "Webhook currency does not match order"
        );
        return Err(WebhookError::AmountMismatch {
            field: "currency",
            reported: notification.currency.clone(),
            expected: order.currency.clone(),
        });
    }

    Ok(())
}
