//! Test utilities and fixtures for checkout integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use sha2::Sha512;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

pub use wata_checkout::api::{self, AppState};
pub use wata_checkout::config::Config;
pub use wata_checkout::database::{InMemoryStore, OrderStore, WebhookEventLog};
pub use wata_checkout::error::{AppError, AppResult};
pub use wata_checkout::orders::{Order, OrderStatus};
pub use wata_checkout::payments::{PaymentLink, PaymentLinkRequest, PaymentProvider, VerificationKey};

pub const PROVIDER_PUBLIC_KEY: &str = include_str!("../fixtures/provider_public_key.pem");
pub const PROVIDER_PRIVATE_KEY: &str = include_str!("../fixtures/provider_private_key.pem");
pub const FORGER_PRIVATE_KEY: &str = include_str!("../fixtures/forger_private_key.pem");

/// Provider double: hands out sequential links and the fixture public key
#[derive(Default)]
pub struct MockProvider {
    pub link_calls: AtomicUsize,
    pub key_calls: AtomicUsize,
    pub fail_links: AtomicBool,
    pub fail_key: AtomicBool,
}

#[async_trait]
impl PaymentProvider for MockProvider {
    fn name(&self) -> &'static str {
        "WATA"
    }

    async fn request_payment_link(&self, request: PaymentLinkRequest) -> AppResult<PaymentLink> {
        let n = self.link_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_links.load(Ordering::SeqCst) {
            return Err(AppError::provider("WATA", "HTTP 500: internal error", true));
        }
        Ok(PaymentLink {
            url: format!("https://pay.wata.test/{}", request.provider_order_id),
            provider_transaction_id: Some(format!("tx-{}", n)),
        })
    }

    async fn verification_key(&self) -> AppResult<VerificationKey> {
        self.key_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_key.load(Ordering::SeqCst) {
            return Err(AppError::provider("WATA", "HTTP 503: unavailable", true));
        }
        VerificationKey::from_pem(PROVIDER_PUBLIC_KEY)
            .map_err(|e| AppError::provider("WATA", e, false))
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub provider: Arc<MockProvider>,
}

pub fn test_config() -> Config {
    let builder = Config::defaults()
        .unwrap()
        .set_override("database.url", "postgres://unused/test")
        .unwrap()
        .set_override("provider.api_token", "test-token")
        .unwrap();
    Config::build(builder).unwrap()
}

pub fn test_app() -> TestApp {
    let provider = Arc::new(MockProvider::default());
    let mut app = test_app_with(test_config(), provider.clone());
    app.provider = provider;
    app
}

/// Router over `provider`; the returned `provider` field is a detached mock
pub fn test_app_with(config: Config, provider: Arc<dyn PaymentProvider>) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let state = AppState::new(store.clone(), store.clone(), provider, &config);
    TestApp {
        router: api::router(state, &config.server),
        store,
        provider: Arc::new(MockProvider::default()),
    }
}

impl TestApp {
    pub async fn post_json(&self, uri: &str, body: &Value, headers: &[(&str, &str)]) -> (StatusCode, Value) {
        self.post_raw(uri, serde_json::to_vec(body).unwrap(), headers).await
    }

    pub async fn post_raw(&self, uri: &str, body: Vec<u8>, headers: &[(&str, &str)]) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.send(request.body(Body::from(body)).unwrap()).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    /// Create an order through `POST /wata` and return it as stored
    pub async fn create_order(&self) -> Order {
        let (status, body) = self.post_json("/wata", &checkout_body(), &[]).await;
        assert_eq!(status, StatusCode::OK, "checkout failed: {}", body);
        let order_id = body["order_id"].as_i64().unwrap();
        self.store.find_by_id(order_id).await.unwrap().unwrap()
    }

    /// Deliver a webhook signed with the provider's key
    pub async fn deliver(&self, body: &[u8]) -> (StatusCode, Value) {
        let signature = sign(PROVIDER_PRIVATE_KEY, body);
        self.post_raw("/wata-webhook", body.to_vec(), &[("X-Signature", signature.as_str())])
            .await
    }
}

pub fn checkout_body() -> Value {
    json!({
        "amount": 1500.00,
        "user_name": "Anna Petrova",
        "user_email": "anna@example.ru",
        "user_phone": "+7 (900) 123-45-67",
        "user_address": "Moscow, Tverskaya 1",
        "order_comment": "Ring twice",
        "cart_items": [
            { "id": 1, "name": "Kettle", "price": 1500, "quantity": 1 }
        ],
        "success_url": "https://shop.example/success",
        "fail_url": "https://shop.example/fail"
    })
}

pub fn webhook_body(order: &Order, status: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "transactionId": "3a1f0c52-9d4e-4b8e-a0c1-7e2b9f6d1c11",
        "orderId": order.provider_order_id.unwrap().to_string(),
        "transactionStatus": status,
        "amount": 1500.00,
        "currency": "RUB"
    }))
    .unwrap()
}

/// Base64 RSA PKCS#1 v1.5 / SHA-512 signature of `body`
pub fn sign(private_key_pem: &str, body: &[u8]) -> String {
    let key = RsaPrivateKey::from_pkcs8_pem(private_key_pem).unwrap();
    let signing_key = SigningKey::<Sha512>::new(key);
    BASE64.encode(signing_key.sign(body).to_bytes())
}
