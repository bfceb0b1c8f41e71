//! HTTP surface: router, shared state and handlers

pub mod health;
pub mod payments;
pub mod webhooks;

use crate::config::{Config, ServerConfig};
use crate::database::repository::{OrderStore, WebhookEventLog};
use crate::orders::lifecycle::OrderLifecycle;
use crate::orders::service::CheckoutService;
use crate::payments::signature::SignatureVerifier;
use crate::payments::traits::PaymentProvider;
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const LEGACY_SIGNATURE_HEADER: &str = "x-wata-signature";
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub checkout: Arc<CheckoutService>,
    pub lifecycle: Arc<OrderLifecycle>,
    pub verifier: Arc<SignatureVerifier>,
    pub orders: Arc<dyn OrderStore>,
    pub webhook_log: Arc<dyn WebhookEventLog>,
    pub provider_name: &'static str,
    pub environment: String,
}

impl AppState {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        webhook_log: Arc<dyn WebhookEventLog>,
        provider: Arc<dyn PaymentProvider>,
        config: &Config,
    ) -> Self {
        Self {
            checkout: Arc::new(CheckoutService::new(
                orders.clone(),
                provider.clone(),
                &config.checkout,
                config.provider.currency.clone(),
            )),
            lifecycle: Arc::new(OrderLifecycle::new(orders.clone())),
            provider_name: provider.name(),
            verifier: Arc::new(SignatureVerifier::new(provider)),
            orders,
            webhook_log,
            environment: config.server.environment.clone(),
        }
    }
}

pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let x_request_id = HeaderName::from_static("x-request-id");

    Router::new()
        .route("/health", get(health::health_check))
        .route("/wata", post(payments::create_payment))
        .route("/wata-webhook", post(webhooks::handle_wata_webhook))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                }))
                .layer(PropagateRequestIdLayer::new(x_request_id))
                .layer(TimeoutLayer::new(server.request_timeout()))
                .layer(cors(&server.cors_allowed_origin)),
        )
        .with_state(state)
}

fn cors(allowed_origin: &str) -> CorsLayer {
    let origin = if allowed_origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        match HeaderValue::from_str(allowed_origin.trim()) {
            Ok(origin) => AllowOrigin::exact(origin),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", allowed_origin);
                AllowOrigin::list(Vec::new())
            }
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static(SIGNATURE_HEADER),
            HeaderName::from_static(LEGACY_SIGNATURE_HEADER),
            HeaderName::from_static(IDEMPOTENCY_KEY_HEADER),
        ])
}
