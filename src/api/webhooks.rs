use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

use super::{AppState, LEGACY_SIGNATURE_HEADER, SIGNATURE_HEADER};
use crate::database::webhook_repository::NewWebhookEvent;
use crate::error::{AppErrorKind, AppResult, WebhookError};
use crate::orders::lifecycle::TransitionResult;
use crate::payments::signature::{Verification, VerifiedWebhook};

/// `POST /wata-webhook`: authenticate a provider notification and apply it to its order
///
/// Duplicates of an already-applied notification are acknowledged like fresh ones.
pub async fn handle_wata_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .or_else(|| headers.get(LEGACY_SIGNATURE_HEADER))
        .and_then(|v| v.to_str().ok());
    let body_len = body.len();

    let verified = match state.verifier.verify(body, signature).await {
        Ok(Verification::Verified(verified)) => verified,
        Ok(Verification::Rejected(reason)) => {
            tracing::warn!(
                target: "security",
                reason = reason.as_str(),
                body_len,
                signature_len = signature.map(str::len).unwrap_or(0),
                "Rejected webhook: signature verification failed"
            );
            return Err(WebhookError::SignatureInvalid.into());
        }
        Err(e) => {
            tracing::error!("Webhook verification key unavailable: {}", e);
            return Err(e);
        }
    };

    let webhook = match verified.parse() {
        Ok(webhook) => webhook,
        Err(e) => {
            tracing::warn!("Verified webhook has malformed payload: {}", e);
            return Err(e.into());
        }
    };

    let result = state.lifecycle.apply(&webhook).await;
    record_event(&state, &webhook, &result).await;
    let result = result?;

    tracing::info!(
        "WATA webhook processed: transaction={} order={} status={} outcome={}",
        webhook.notification().transaction_id,
        result.order().order_number,
        result.order().status,
        result.label()
    );

    Ok(Json(json!({ "status": "ok" })))
}

/// Write the audit row. A failure here is logged and does not fail the delivery.
async fn record_event(
    state: &AppState,
    webhook: &VerifiedWebhook,
    result: &AppResult<TransitionResult>,
) {
    let notification = webhook.notification();
    let (outcome, order_id) = match result {
        Ok(transition) => (transition.label(), Some(transition.order().id)),
        Err(e) => (rejection_label(&e.kind), None),
    };

    let event = NewWebhookEvent {
        provider: state.provider_name.to_string(),
        transaction_id: notification.transaction_id.clone(),
        order_reference: notification.order_id.clone(),
        transaction_status: notification.transaction_status.clone(),
        payload: webhook.payload().clone(),
        outcome: outcome.to_string(),
        order_id,
    };

    if let Err(e) = state.webhook_log.record(&event).await {
        tracing::warn!(
            "Failed to record webhook event for transaction {}: {}",
            notification.transaction_id,
            e
        );
    }
}

fn rejection_label(kind: &AppErrorKind) -> &'static str {
    match kind {
        AppErrorKind::Webhook(WebhookError::UnknownOrder { .. }) => "unknown_order",
        AppErrorKind::Webhook(WebhookError::UnrecognizedOutcome { .. }) => "unrecognized_outcome",
        AppErrorKind::Webhook(WebhookError::AmountMismatch { .. }) => "amount_mismatch",
        AppErrorKind::Webhook(_) => "rejected",
        _ => "error",
    }
}
