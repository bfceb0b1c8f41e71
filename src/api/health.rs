use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use super::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub database: String,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let (status, database) = match state.orders.health_check().await {
        Ok(()) => (StatusCode::OK, "up"),
        Err(e) => {
            tracing::error!("Order store unreachable: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "down")
        }
    };

    let response = HealthResponse {
        status: if status.is_success() { "healthy" } else { "unhealthy" }.to_string(),
        version,
        environment: state.environment.clone(),
        database: database.to_string(),
    };

    (status, Json(response))
}
