//! Payment provider integration module
//!
//! Outbound calls to WATA (payment links, public key) and verification of
//! the webhooks it sends back.

pub mod providers;
pub mod signature;
pub mod traits;
pub mod types;

pub use signature::{RejectionReason, SignatureVerifier, Verification, VerificationKey, VerifiedWebhook};
pub use traits::PaymentProvider;
pub use types::{PaymentLink, PaymentLinkRequest, WebhookNotification};
