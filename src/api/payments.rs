use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use super::{AppState, IDEMPOTENCY_KEY_HEADER};
use crate::error::{AppError, AppResult};
use crate::orders::service::PaymentCreated;
use crate::orders::validation::CreatePaymentRequest;

/// `POST /wata`: validate the cart, create a pending order and return its payment link
pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> AppResult<Json<PaymentCreated>> {
    let Json(request) = payload.map_err(|rejection| AppError::validation("body", rejection.body_text()))?;

    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let draft = request.validate(idempotency_key)?;
    let created = state.checkout.create_payment(draft).await?;
    Ok(Json(created))
}
