//! Payment provider types and data structures

use crate::orders::models::Order;
use crate::orders::validation::{string_or_number, RedirectUrls};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Payment link request for a persisted order
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentLinkRequest {
    pub order_number: String,
    /// Sent to the provider as its `orderId`; webhooks refer back to it
    pub provider_order_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub success_url: Option<String>,
    pub fail_url: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

impl PaymentLinkRequest {
    /// `None` for legacy rows without a provider order id
    pub fn for_order(order: &Order, redirects: &RedirectUrls) -> Option<Self> {
        Some(Self {
            order_number: order.order_number.clone(),
            provider_order_id: order.provider_order_id?,
            amount: order.amount,
            currency: order.currency.clone(),
            success_url: redirects.success.clone(),
            fail_url: redirects.fail.clone(),
            customer_email: Some(order.user_email.clone()).filter(|e| !e.is_empty()),
            customer_phone: Some(order.user_phone.clone()).filter(|p| !p.is_empty()),
        })
    }
}

/// Payment link issued by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLink {
    pub url: String,
    pub provider_transaction_id: Option<String>,
}

/// Provider notification body, as sent to `POST /wata-webhook`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookNotification {
    #[serde(deserialize_with = "string_or_number")]
    pub transaction_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub order_id: String,
    pub transaction_status: String,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub payment_time: Option<String>,
    #[serde(default)]
    pub commission: Option<Decimal>,
    #[serde(default)]
    pub email: Option<String>,
}

impl WebhookNotification {
    /// Provider-supplied reason for a failed payment
    pub fn failure_reason(&self) -> Option<String> {
        match (&self.error_code, &self.error_description) {
            (Some(code), Some(description)) => Some(format!("{}: {}", code, description)),
            (None, Some(description)) => Some(description.clone()),
            (Some(code), None) => Some(code.clone()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_notification_accepts_numeric_ids() {
        let notification: WebhookNotification = serde_json::from_value(json!({
            "transactionId": "3a1f0c52-9d4e-4b8e-a0c1-7e2b9f6d1c11",
            "orderId": 483920117,
            "transactionStatus": "Paid",
            "amount": 1500.00,
            "currency": "RUB",
            "commission": 45.5
        }))
        .unwrap();
        assert_eq!(notification.order_id, "483920117");
        assert_eq!(notification.amount, dec!(1500));
        assert_eq!(notification.commission, Some(dec!(45.5)));
        assert_eq!(notification.failure_reason(), None);
    }

    #[test]
    fn test_notification_payment_details() {
        let notification: WebhookNotification = serde_json::from_value(json!({
            "transactionId": "t",
            "orderId": "1",
            "transactionStatus": "Paid",
            "transactionType": "CardCrypto",
            "paymentTime": "2026-01-05T10:31:12Z",
            "amount": 10,
            "currency": "RUB",
            "email": "buyer@example.ru"
        }))
        .unwrap();
        assert_eq!(notification.transaction_type.as_deref(), Some("CardCrypto"));
        assert_eq!(notification.payment_time.as_deref(), Some("2026-01-05T10:31:12Z"));
        assert_eq!(notification.email.as_deref(), Some("buyer@example.ru"));
        assert_eq!(notification.commission, None);
    }

    #[test]
    fn test_notification_requires_status() {
        let result = serde_json::from_value::<WebhookNotification>(json!({
            "transactionId": "t",
            "orderId": "1",
            "amount": 10,
            "currency": "RUB"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_failure_reason() {
        let notification: WebhookNotification = serde_json::from_value(json!({
            "transactionId": "t",
            "orderId": "1",
            "transactionStatus": "Rejected",
            "amount": 10,
            "currency": "RUB",
            "errorCode": "InsufficientFunds",
            "errorDescription": "Card balance too low"
        }))
        .unwrap();
        assert_eq!(
            notification.failure_reason().as_deref(),
            Some("InsufficientFunds: Card balance too low")
        );
    }
}
