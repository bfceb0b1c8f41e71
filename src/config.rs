use anyhow::{anyhow, Context, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub checkout: CheckoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub request_timeout_secs: u64,
    pub cors_allowed_origin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    /// Keep orders in process memory instead of Postgres; lost on restart
    #[serde(default)]
    pub in_memory: bool,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub api_url: String,
    pub api_token: String,
    pub currency: String,
    pub link_ttl_hours: i64,
    pub request_timeout_secs: u64,
    pub key_request_timeout_secs: u64,
    pub key_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfig {
    pub idempotency_window_hours: i64,
    pub order_number_prefix: String,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn key_request_timeout(&self) -> Duration {
        Duration::from_secs(self.key_request_timeout_secs)
    }

    pub fn key_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.key_cache_ttl_secs)
    }
}

/// Flat variables used by existing deployments, mapped onto nested keys
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("ENVIRONMENT", "server.environment"),
    ("DATABASE_URL", "database.url"),
    ("DATABASE_MAX_CONNECTIONS", "database.max_connections"),
    ("DATABASE_IN_MEMORY", "database.in_memory"),
    ("WATA_API_URL", "provider.api_url"),
    ("WATA_API_TOKEN", "provider.api_token"),
];

impl Config {
    /// Built-in defaults. `provider.api_token` has none, and `database.url`
    /// is required unless `database.in_memory` is set.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080_i64)?
            .set_default("server.environment", "development")?
            .set_default("server.request_timeout_secs", 30_i64)?
            .set_default("server.cors_allowed_origin", "*")?
            .set_default("database.max_connections", 20_i64)?
            .set_default("database.min_connections", 1_i64)?
            .set_default("database.acquire_timeout_secs", 10_i64)?
            .set_default("provider.api_url", "https://api.wata.pro/api/h2h")?
            .set_default("provider.currency", "RUB")?
            .set_default("provider.link_ttl_hours", 24_i64)?
            .set_default("provider.request_timeout_secs", 20_i64)?
            .set_default("provider.key_request_timeout_secs", 10_i64)?
            .set_default("provider.key_cache_ttl_secs", 3600_i64)?
            .set_default("checkout.idempotency_window_hours", 24_i64)?
            .set_default("checkout.order_number_prefix", "ORD")?;
        Ok(builder)
    }

    /// Defaults, then `config/wata-checkout.*`, then `SECTION__KEY` variables,
    /// then the legacy flat variables.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::defaults()?
            .add_source(File::with_name("config/wata-checkout").required(false))
            .add_source(Environment::default().separator("__").try_parsing(true));

        for (var, key) in LEGACY_ENV_KEYS {
            builder = builder
                .set_override_option(*key, env::var(var).ok())
                .with_context(|| format!("Invalid value for {}", var))?;
        }

        Self::build(builder)
    }

    pub fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Config = builder
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Configuration is incomplete (DATABASE_URL and WATA_API_TOKEN are required)")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Validate port range
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(anyhow!("server.request_timeout_secs must be greater than 0"));
        }

        if self.database.in_memory {
            if self.server.environment == "production" {
                return Err(anyhow!("database.in_memory is not allowed in production"));
            }
        } else if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(anyhow!(
                "database.min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            ));
        }

        if self.provider.api_token.trim().is_empty() {
            return Err(anyhow!("WATA_API_TOKEN cannot be empty"));
        }

        if !self.provider.api_url.starts_with("http://") && !self.provider.api_url.starts_with("https://") {
            return Err(anyhow!(
                "WATA_API_URL must be an http(s) URL, got {}",
                self.provider.api_url
            ));
        }

        if self.provider.currency.len() != 3 {
            return Err(anyhow!(
                "provider.currency must be a 3-letter code, got {}",
                self.provider.currency
            ));
        }

        if self.provider.link_ttl_hours <= 0 {
            return Err(anyhow!("provider.link_ttl_hours must be greater than 0"));
        }

        if self.provider.request_timeout_secs == 0 || self.provider.key_request_timeout_secs == 0 {
            return Err(anyhow!("Provider timeouts must be greater than 0"));
        }

        // Provider calls must give up before the server-wide request timeout does
        let slowest_call = self
            .provider
            .request_timeout_secs
            .max(self.provider.key_request_timeout_secs);
        if slowest_call >= self.server.request_timeout_secs {
            return Err(anyhow!(
                "Provider timeouts ({}s) must be shorter than server.request_timeout_secs ({}s)",
                slowest_call,
                self.server.request_timeout_secs
            ));
        }

        if self.checkout.idempotency_window_hours <= 0 {
            return Err(anyhow!("checkout.idempotency_window_hours must be greater than 0"));
        }

        if self.checkout.order_number_prefix.trim().is_empty() {
            return Err(anyhow!("checkout.order_number_prefix cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ConfigBuilder<DefaultState> {
        Config::defaults()
            .unwrap()
            .set_override("database.url", "postgres://localhost/wata")
            .unwrap()
            .set_override("provider.api_token", "token")
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::build(builder()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.provider.api_url, "https://api.wata.pro/api/h2h");
        assert_eq!(config.provider.currency, "RUB");
        assert_eq!(config.provider.request_timeout(), Duration::from_secs(20));
        assert!(!config.database.in_memory);
        assert_eq!(config.provider.key_cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.checkout.order_number_prefix, "ORD");
    }

    #[test]
    fn test_provider_timeout_must_undercut_server_timeout() {
        let builder = builder()
            .set_override("server.request_timeout_secs", 30_i64)
            .unwrap()
            .set_override("provider.request_timeout_secs", 30_i64)
            .unwrap();
        assert!(Config::build(builder).is_err());

        let builder = self::builder()
            .set_override("server.request_timeout_secs", 5_i64)
            .unwrap()
            .set_override("provider.request_timeout_secs", 3_i64)
            .unwrap()
            .set_override("provider.key_request_timeout_secs", 6_i64)
            .unwrap();
        assert!(Config::build(builder).is_err());
    }

    #[test]
    fn test_in_memory_store_needs_no_database_url() {
        let builder = Config::defaults()
            .unwrap()
            .set_override("provider.api_token", "token")
            .unwrap();
        assert!(Config::build(builder).is_err());

        let builder = Config::defaults()
            .unwrap()
            .set_override("provider.api_token", "token")
            .unwrap()
            .set_override("database.in_memory", true)
            .unwrap();
        let config = Config::build(builder).unwrap();
        assert!(config.database.in_memory);

        let builder = Config::defaults()
            .unwrap()
            .set_override("provider.api_token", "token")
            .unwrap()
            .set_override("database.in_memory", true)
            .unwrap()
            .set_override("server.environment", "production")
            .unwrap();
        assert!(Config::build(builder).is_err());
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let builder = Config::defaults()
            .unwrap()
            .set_override("database.url", "postgres://localhost/wata")
            .unwrap();
        assert!(Config::build(builder).is_err());
    }

    #[test]
    fn test_low_port_is_rejected() {
        let builder = builder().set_override("server.port", 80_i64).unwrap();
        let err = Config::build(builder).unwrap_err();
        assert!(err.to_string().contains("Port must be at least 1024"));
    }

    #[test]
    fn test_unknown_environment_is_rejected() {
        let builder = builder().set_override("server.environment", "qa").unwrap();
        assert!(Config::build(builder).is_err());
    }

    #[test]
    fn test_currency_must_be_three_letters() {
        let builder = builder().set_override("provider.currency", "RUBLE").unwrap();
        assert!(Config::build(builder).is_err());
    }
}
