//! Payment provider trait definitions

use crate::error::AppResult;
use crate::payments::signature::VerificationKey;
use crate::payments::types::{PaymentLink, PaymentLinkRequest};
use async_trait::async_trait;

/// Outbound side of a payment provider integration
///
/// Implementations make network calls only; they never touch the order store.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Provider name used in logs, errors and the webhook audit log
    fn name(&self) -> &'static str;

    /// Request a hosted payment link for an order
    ///
    /// One attempt, bounded by the provider's request timeout. Network errors,
    /// non-success statuses and responses without a link are all errors.
    async fn request_payment_link(&self, request: PaymentLinkRequest) -> AppResult<PaymentLink>;

    /// Public key used to verify webhook signatures
    ///
    /// Implementations cache the key; concurrent refreshes are allowed and
    /// the most recently fetched key wins.
    async fn verification_key(&self) -> AppResult<VerificationKey>;
}
