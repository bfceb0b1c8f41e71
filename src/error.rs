//! Application error taxonomy
//!
//! Every failure a request can hit is an [`AppError`]. The kind decides the
//! HTTP status; the message becomes the `{"error": ...}` body. Infrastructure
//! and database details are logged but never sent to the caller.

use crate::database::error::DatabaseError;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde_json::json;
use std::fmt;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Malformed or out-of-range client input, rejected before any write
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failures talking to the payment provider
#[derive(Debug, Clone, Error)]
pub enum ExternalError {
    #[error("{provider} request failed: {message}")]
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },

    #[error("{service} did not respond within {seconds} seconds")]
    Timeout { service: String, seconds: u64 },
}

/// Webhook rejections
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Invalid signature")]
    SignatureInvalid,

    #[error("Malformed webhook payload: {message}")]
    MalformedPayload { message: String },

    #[error("Order not found: {reference}")]
    UnknownOrder { reference: String },

    #[error("Unrecognized transaction status '{status}'")]
    UnrecognizedOutcome { status: String },

    #[error("Webhook {field} '{reported}' does not match order value '{expected}'")]
    AmountMismatch {
        field: &'static str,
        reported: String,
        expected: String,
    },
}

/// Request conflicts with existing state
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("Idempotency key '{key}' was already used for a different request")]
    IdempotencyKeyMismatch { key: String },

    #[error("Idempotency key '{key}' has expired")]
    IdempotencyKeyExpired { key: String },

    #[error("Order {order_number} is already {status}")]
    OrderClosed { order_number: String, status: String },
}

#[derive(Debug, Clone, Error)]
pub enum InfrastructureError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Verification key error: {message}")]
    VerificationKey { message: String },

    #[error("Order identifiers exhausted after {attempts} attempts")]
    IdentifierExhausted { attempts: u32 },

    #[error("Order {order_number} has no provider order id")]
    MissingProviderReference { order_number: String },
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Validation(ValidationError),
    External(ExternalError),
    Webhook(WebhookError),
    Conflict(ConflictError),
    Database(DatabaseError),
    Infrastructure(InfrastructureError),
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::new(field, message).into()
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>, is_retryable: bool) -> Self {
        ExternalError::PaymentProvider {
            provider: provider.into(),
            message: message.into(),
            is_retryable,
        }
        .into()
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            AppErrorKind::Validation(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::External(ExternalError::PaymentProvider { .. }) => StatusCode::BAD_GATEWAY,
            AppErrorKind::External(ExternalError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            AppErrorKind::Webhook(err) => match err {
                WebhookError::SignatureInvalid => StatusCode::UNAUTHORIZED,
                WebhookError::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
                WebhookError::UnknownOrder { .. } => StatusCode::NOT_FOUND,
                WebhookError::UnrecognizedOutcome { .. } | WebhookError::AmountMismatch { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
            },
            AppErrorKind::Conflict(_) => StatusCode::CONFLICT,
            AppErrorKind::Infrastructure(InfrastructureError::VerificationKey { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            AppErrorKind::Database(_) | AppErrorKind::Infrastructure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand back to the caller
    pub fn public_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Database(_) | AppErrorKind::Infrastructure(_) => {
                "Internal server error".to_string()
            }
            AppErrorKind::Validation(err) => err.to_string(),
            AppErrorKind::External(err) => err.to_string(),
            AppErrorKind::Webhook(err) => err.to_string(),
            AppErrorKind::Conflict(err) => err.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::External(ExternalError::PaymentProvider { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::External(ExternalError::Timeout { .. }) => true,
            AppErrorKind::Database(err) => err.is_retryable(),
            _ => false,
        }
    }

    pub fn webhook(&self) -> Option<&WebhookError> {
        match &self.kind {
            AppErrorKind::Webhook(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AppErrorKind::Validation(err) => write!(f, "{}", err)?,
            AppErrorKind::External(err) => write!(f, "{}", err)?,
            AppErrorKind::Webhook(err) => write!(f, "{}", err)?,
            AppErrorKind::Conflict(err) => write!(f, "{}", err)?,
            AppErrorKind::Database(err) => write!(f, "{}", err)?,
            AppErrorKind::Infrastructure(err) => write!(f, "{}", err)?,
        }
        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }
}

impl From<ExternalError> for AppError {
    fn from(err: ExternalError) -> Self {
        Self::new(AppErrorKind::External(err))
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        Self::new(AppErrorKind::Webhook(err))
    }
}

impl From<ConflictError> for AppError {
    fn from(err: ConflictError) -> Self {
        Self::new(AppErrorKind::Conflict(err))
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        Self::new(AppErrorKind::Database(err))
    }
}

impl From<InfrastructureError> for AppError {
    fn from(err: InfrastructureError) -> Self {
        Self::new(AppErrorKind::Infrastructure(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::error::DatabaseErrorKind;

    #[test]
    fn test_taxonomy_status_codes() {
        assert_eq!(
            AppError::validation("amount", "must be positive").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(WebhookError::SignatureInvalid).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(WebhookError::UnknownOrder {
                reference: "123".into()
            })
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(WebhookError::UnrecognizedOutcome {
                status: "refunded".into()
            })
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::provider("WATA", "HTTP 500", true).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::from(ConflictError::IdempotencyKeyExpired { key: "k".into() }).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_internal_details_are_not_public() {
        let err = AppError::from(DatabaseError::new(DatabaseErrorKind::QueryError {
            message: "relation \"orders\" does not exist".into(),
        }));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");
        assert!(err.to_string().contains("relation"));
    }

    #[test]
    fn test_validation_message_names_field() {
        let err = AppError::validation("user_phone", "must contain exactly 11 digits");
        assert_eq!(err.public_message(), "user_phone: must contain exactly 11 digits");
    }

    #[test]
    fn test_retryable() {
        assert!(AppError::provider("WATA", "connection reset", true).is_retryable());
        assert!(!AppError::validation("amount", "bad").is_retryable());
        assert!(AppError::from(ExternalError::Timeout {
            service: "WATA".into(),
            seconds: 60
        })
        .is_retryable());
    }
}
