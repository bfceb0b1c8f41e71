//! Webhook signature verification
//!
//! Inbound webhook bytes are untrusted until [`SignatureVerifier::verify`]
//! says otherwise. The only way to obtain a [`VerifiedBody`], and from it a
//! [`VerifiedWebhook`], is through a successful verification, so the rest of
//! the service cannot act on an unauthenticated payload by accident.
//!
//! The signature is RSA PKCS#1 v1.5 over SHA-512 of the exact request body,
//! base64-encoded in the `X-Signature` header.

use crate::error::{AppResult, WebhookError};
use crate::payments::traits::PaymentProvider;
use crate::payments::types::WebhookNotification;
use axum::body::Bytes;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::Sha512;
use std::fmt;
use std::sync::Arc;

/// Parsed provider public key
#[derive(Clone)]
pub struct VerificationKey {
    key: Arc<VerifyingKey<Sha512>>,
}

impl VerificationKey {
    /// Accepts SPKI (`BEGIN PUBLIC KEY`) and PKCS#1 (`BEGIN RSA PUBLIC KEY`) PEM
    pub fn from_pem(pem: &str) -> Result<Self, String> {
        let pem = pem.trim();
        let public_key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| format!("Failed to parse RSA public key: {}", e))?;

        Ok(Self {
            key: Arc::new(VerifyingKey::<Sha512>::new(public_key)),
        })
    }

    /// `false` for any signature that does not verify, including malformed ones
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match Signature::try_from(signature) {
            Ok(signature) => self.key.verify(message, &signature).is_ok(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey").finish_non_exhaustive()
    }
}

/// Why a webhook was not authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    MissingSignature,
    MalformedSignature,
    SignatureMismatch,
}

impl RejectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionReason::MissingSignature => "missing_signature",
            RejectionReason::MalformedSignature => "malformed_signature",
            RejectionReason::SignatureMismatch => "signature_mismatch",
        }
    }
}

/// Outcome of checking a webhook signature. A rejection is an expected result, not an error.
#[derive(Debug)]
pub enum Verification {
    Verified(VerifiedBody),
    Rejected(RejectionReason),
}

/// Request body whose signature checked out
#[derive(Debug, Clone)]
pub struct VerifiedBody {
    body: Bytes,
}

impl VerifiedBody {
    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Parse the authenticated body into a notification
    pub fn parse(self) -> Result<VerifiedWebhook, WebhookError> {
        let payload: serde_json::Value =
            serde_json::from_slice(&self.body).map_err(|_| WebhookError::MalformedPayload {
                message: "Invalid JSON".to_string(),
            })?;

        let notification: WebhookNotification = serde_json::from_value(payload.clone())
            .map_err(|e| WebhookError::MalformedPayload {
                message: e.to_string(),
            })?;

        for (field, value) in [
            ("transactionId", &notification.transaction_id),
            ("orderId", &notification.order_id),
            ("transactionStatus", &notification.transaction_status),
            ("currency", &notification.currency),
        ] {
            if value.trim().is_empty() {
                return Err(WebhookError::MalformedPayload {
                    message: format!("{} must not be empty", field),
                });
            }
        }

        Ok(VerifiedWebhook {
            notification,
            payload,
        })
    }
}

/// Authenticated, well-formed provider notification
#[derive(Debug, Clone)]
pub struct VerifiedWebhook {
    notification: WebhookNotification,
    payload: serde_json::Value,
}

impl VerifiedWebhook {
    pub fn notification(&self) -> &WebhookNotification {
        &self.notification
    }

    /// The body as received, for the audit log
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    #[cfg(test)]
    pub(crate) fn trusted_for_tests(payload: serde_json::Value) -> Self {
        let notification = serde_json::from_value(payload.clone()).expect("test notification");
        Self {
            notification,
            payload,
        }
    }
}

/// Checks webhook bodies against the provider's public key
pub struct SignatureVerifier {
    provider: Arc<dyn PaymentProvider>,
}

impl SignatureVerifier {
    pub fn new(provider: Arc<dyn PaymentProvider>) -> Self {
        Self { provider }
    }

    /// Errors only when the key cannot be obtained; a bad signature is `Ok(Rejected)`
    pub async fn verify(&self, body: Bytes, signature: Option<&str>) -> AppResult<Verification> {
        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Verification::Rejected(RejectionReason::MissingSignature));
        };

        let Ok(signature) = BASE64.decode(signature) else {
            return Ok(Verification::Rejected(RejectionReason::MalformedSignature));
        };

        let key = self.provider.verification_key().await?;
        if key.verify(&body, &signature) {
            Ok(Verification::Verified(VerifiedBody { body }))
        } else {
            Ok(Verification::Rejected(RejectionReason::SignatureMismatch))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::payments::types::{PaymentLink, PaymentLinkRequest};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PUBLIC_KEY: &str = include_str!("../../tests/fixtures/provider_public_key.pem");
    const PUBLIC_KEY_PKCS1: &str = include_str!("../../tests/fixtures/provider_public_key_pkcs1.pem");
    const SIGNED_BODY: &str = include_str!("../../tests/fixtures/signed_webhook_body.json");
    const SIGNATURE: &str = include_str!("../../tests/fixtures/signed_webhook_body.sig");

    struct FixedKeyProvider {
        key: Option<VerificationKey>,
        key_requests: AtomicUsize,
    }

    impl FixedKeyProvider {
        fn new(key: Option<VerificationKey>) -> Arc<Self> {
            Arc::new(Self {
                key,
                key_requests: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PaymentProvider for FixedKeyProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn request_payment_link(&self, _request: PaymentLinkRequest) -> AppResult<PaymentLink> {
            Err(AppError::provider("fixed", "not supported", false))
        }

        async fn verification_key(&self) -> AppResult<VerificationKey> {
            self.key_requests.fetch_add(1, Ordering::SeqCst);
            self.key
                .clone()
                .ok_or_else(|| AppError::provider("fixed", "public key endpoint returned 503", true))
        }
    }

    fn verifier() -> (SignatureVerifier, Arc<FixedKeyProvider>) {
        let provider = FixedKeyProvider::new(Some(VerificationKey::from_pem(PUBLIC_KEY).unwrap()));
        (SignatureVerifier::new(provider.clone()), provider)
    }

    #[test]
    fn test_key_parses_spki_and_pkcs1() {
        let spki = VerificationKey::from_pem(PUBLIC_KEY).unwrap();
        let pkcs1 = VerificationKey::from_pem(PUBLIC_KEY_PKCS1).unwrap();
        let signature = BASE64.decode(SIGNATURE.trim()).unwrap();
        assert!(spki.verify(SIGNED_BODY.as_bytes(), &signature));
        assert!(pkcs1.verify(SIGNED_BODY.as_bytes(), &signature));
    }

    #[test]
    fn test_garbage_pem_is_an_error() {
        assert!(VerificationKey::from_pem("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----").is_err());
    }

    #[tokio::test]
    async fn test_valid_signature_verifies() {
        let (verifier, _) = verifier();
        let result = verifier
            .verify(Bytes::from_static(SIGNED_BODY.as_bytes()), Some(SIGNATURE.trim()))
            .await
            .unwrap();

        let Verification::Verified(body) = result else {
            panic!("expected verified body, got {:?}", result);
        };
        let webhook = body.parse().unwrap();
        assert_eq!(webhook.notification().order_id, "483920117");
        assert_eq!(webhook.notification().transaction_status, "Paid");
    }

    #[tokio::test]
    async fn test_tampered_body_is_rejected() {
        let (verifier, _) = verifier();
        let tampered = SIGNED_BODY.replace("1500.00", "15.00");
        let result = verifier
            .verify(Bytes::from(tampered), Some(SIGNATURE.trim()))
            .await
            .unwrap();
        assert!(matches!(
            result,
            Verification::Rejected(RejectionReason::SignatureMismatch)
        ));
    }

    #[tokio::test]
    async fn test_reserialized_body_is_rejected() {
        // Same JSON, different bytes
        let (verifier, _) = verifier();
        let value: serde_json::Value = serde_json::from_str(SIGNED_BODY).unwrap();
        let reserialized = serde_json::to_vec_pretty(&value).unwrap();
        let result = verifier
            .verify(Bytes::from(reserialized), Some(SIGNATURE.trim()))
            .await
            .unwrap();
        assert!(matches!(result, Verification::Rejected(_)));
    }

    #[tokio::test]
    async fn test_missing_and_malformed_signatures() {
        let (verifier, provider) = verifier();
        let body = Bytes::from_static(SIGNED_BODY.as_bytes());

        let result = verifier.verify(body.clone(), None).await.unwrap();
        assert!(matches!(
            result,
            Verification::Rejected(RejectionReason::MissingSignature)
        ));

        let result = verifier.verify(body.clone(), Some("  ")).await.unwrap();
        assert!(matches!(
            result,
            Verification::Rejected(RejectionReason::MissingSignature)
        ));

        let result = verifier.verify(body.clone(), Some("%%% not base64 %%%")).await.unwrap();
        assert!(matches!(
            result,
            Verification::Rejected(RejectionReason::MalformedSignature)
        ));

        // Valid base64, wrong length for the key
        let result = verifier.verify(body, Some("c2hvcnQ=")).await.unwrap();
        assert!(matches!(
            result,
            Verification::Rejected(RejectionReason::SignatureMismatch)
        ));

        // Only the last case needed the key
        assert_eq!(provider.key_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_key_failure_is_an_error_not_a_rejection() {
        let verifier = SignatureVerifier::new(FixedKeyProvider::new(None));
        let result = verifier
            .verify(Bytes::from_static(SIGNED_BODY.as_bytes()), Some(SIGNATURE.trim()))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let body = VerifiedBody {
            body: Bytes::from_static(br#"{"transactionId":"t","transactionStatus":"Paid"}"#),
        };
        assert!(matches!(
            body.parse(),
            Err(WebhookError::MalformedPayload { .. })
        ));

        let body = VerifiedBody {
            body: Bytes::from_static(b"not json"),
        };
        assert_eq!(
            body.parse().unwrap_err(),
            WebhookError::MalformedPayload {
                message: "Invalid JSON".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_blank_reference() {
        let body = VerifiedBody {
            body: Bytes::from_static(
                br#"{"transactionId":"t","orderId":" ","transactionStatus":"Paid","amount":1,"currency":"RUB"}"#,
            ),
        };
        assert!(matches!(
            body.parse(),
            Err(WebhookError::MalformedPayload { message }) if message.contains("orderId")
        ));
    }
}
