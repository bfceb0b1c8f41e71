//! WATA payment provider implementation
//!
//! Two outbound calls: `POST {api_url}/links` to create a hosted payment
//! link, and `GET {api_url}/public-key` for the key that signs webhooks.

use crate::config::ProviderConfig;
use crate::error::{AppError, AppResult, ExternalError, InfrastructureError};
use crate::payments::signature::VerificationKey;
use crate::payments::traits::PaymentProvider;
use crate::payments::types::{PaymentLink, PaymentLinkRequest};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use moka::future::Cache;
use reqwest::{Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const PROVIDER_NAME: &str = "WATA";
const KEY_CACHE_ENTRY: &str = "public-key";
const MAX_ERROR_BODY: usize = 500;

/// WATA provider configuration
#[derive(Debug, Clone)]
pub struct WataConfig {
    /// API base URL, without trailing slash
    pub api_url: String,
    /// Bearer token for the merchant account
    pub api_token: String,
    /// Lifetime of a payment link
    pub link_ttl: ChronoDuration,
    pub request_timeout: Duration,
    pub key_request_timeout: Duration,
    pub key_cache_ttl: Duration,
}

impl Default for WataConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.wata.pro/api/h2h".to_string(),
            api_token: String::new(),
            link_ttl: ChronoDuration::hours(24),
            request_timeout: Duration::from_secs(20),
            key_request_timeout: Duration::from_secs(10),
            key_cache_ttl: Duration::from_secs(3600),
        }
    }
}

impl From<&ProviderConfig> for WataConfig {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            link_ttl: ChronoDuration::hours(config.link_ttl_hours),
            request_timeout: config.request_timeout(),
            key_request_timeout: config.key_request_timeout(),
            key_cache_ttl: config.key_cache_ttl(),
        }
    }
}

/// `POST /links` body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLinkBody<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    currency: &'a str,
    order_id: String,
    description: String,
    expiration_date_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    success_redirect_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fail_redirect_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_phone: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLinkResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payment_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublicKeyResponse {
    #[serde(default)]
    value: Option<String>,
}

/// WATA payment provider
pub struct WataProvider {
    config: WataConfig,
    client: Client,
    key_cache: Cache<&'static str, VerificationKey>,
}

impl WataProvider {
    pub fn new(config: WataConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                AppError::from(InfrastructureError::Configuration {
                    message: format!("Failed to create HTTP client: {}", e),
                })
            })?;

        let key_cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(config.key_cache_ttl)
            .build();

        Ok(Self {
            config,
            client,
            key_cache,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url, path)
    }

    fn link_body<'a>(&self, request: &'a PaymentLinkRequest, now: DateTime<Utc>) -> CreateLinkBody<'a> {
        CreateLinkBody {
            amount: request.amount.round_dp(2),
            currency: &request.currency,
            order_id: request.provider_order_id.to_string(),
            description: format!("Order {}", request.order_number),
            expiration_date_time: (now + self.config.link_ttl)
                .format("%Y-%m-%dT%H:%M:%SZ")
                .to_string(),
            success_redirect_url: request.success_url.as_deref(),
            fail_redirect_url: request.fail_url.as_deref(),
            customer_email: request.customer_email.as_deref(),
            customer_phone: request.customer_phone.as_deref(),
        }
    }

    async fn fetch_verification_key(&self) -> AppResult<VerificationKey> {
        info!("Fetching WATA public key");

        let limit = self.config.key_request_timeout;
        let request = self
            .client
            .get(self.endpoint("/public-key"))
            .bearer_auth(&self.config.api_token);

        let response = check_status(send(request, limit).await?).await?;
        let body: PublicKeyResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                return transport_error(e, limit);
            }
            error!("Failed to parse WATA public key response: {}", e);
            AppError::provider(PROVIDER_NAME, format!("Invalid response format: {}", e), false)
        })?;

        let pem = body
            .value
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppError::provider(PROVIDER_NAME, "Public key missing from response", false))?;

        VerificationKey::from_pem(&pem)
            .map_err(|message| InfrastructureError::VerificationKey { message }.into())
    }
}

/// Send with a deadline that runs from connect until the body is read
async fn send(request: RequestBuilder, limit: Duration) -> AppResult<reqwest::Response> {
    request
        .timeout(limit)
        .send()
        .await
        .map_err(|e| transport_error(e, limit))
}

fn transport_error(e: reqwest::Error, limit: Duration) -> AppError {
    if e.is_timeout() {
        warn!("WATA request timed out after {:?}", limit);
        ExternalError::Timeout {
            service: PROVIDER_NAME.to_string(),
            seconds: limit.as_secs(),
        }
        .into()
    } else {
        error!("WATA request failed: {}", e);
        AppError::provider(PROVIDER_NAME, e.to_string(), true)
    }
}

async fn check_status(response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
    error!("WATA API error: HTTP {}: {}", status, snippet);

    Err(AppError::provider(
        PROVIDER_NAME,
        format!("HTTP {}: {}", status.as_u16(), snippet),
        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
    ))
}

#[async_trait]
impl PaymentProvider for WataProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn request_payment_link(&self, request: PaymentLinkRequest) -> AppResult<PaymentLink> {
        info!(
            "Requesting WATA payment link: order={} wata_order_id={} amount={} {}",
            request.order_number, request.provider_order_id, request.amount, request.currency
        );

        let limit = self.config.request_timeout;
        let body = self.link_body(&request, Utc::now());
        let http_request = self
            .client
            .post(self.endpoint("/links"))
            .bearer_auth(&self.config.api_token)
            .json(&body);

        let response = check_status(send(http_request, limit).await?).await?;
        let link: CreateLinkResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                return transport_error(e, limit);
            }
            error!("Failed to parse WATA link response: {}", e);
            AppError::provider(PROVIDER_NAME, "Invalid response from WATA API", false)
        })?;

        let url = link
            .payment_url
            .or(link.url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AppError::provider(PROVIDER_NAME, "Invalid response from WATA API", false))?;

        info!(
            "WATA payment link created: order={} transaction={}",
            request.order_number,
            link.id.as_deref().unwrap_or("-")
        );

        Ok(PaymentLink {
            url,
            provider_transaction_id: link.id,
        })
    }

    async fn verification_key(&self) -> AppResult<VerificationKey> {
        if let Some(key) = self.key_cache.get(KEY_CACHE_ENTRY).await {
            debug!("WATA public key cache hit");
            return Ok(key);
        }

        // Concurrent misses may both fetch; whichever inserts last wins.
        let key = self.fetch_verification_key().await?;
        self.key_cache.insert(KEY_CACHE_ENTRY, key.clone()).await;
        Ok(key)
    }
}
