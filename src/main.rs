use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wata_checkout::api::{self, AppState};
use wata_checkout::config::Config;
use wata_checkout::database::{
    self, schema, InMemoryStore, OrderRepository, OrderStore, PoolConfig, WebhookEventLog,
    WebhookRepository,
};
use wata_checkout::payments::providers::{WataConfig, WataProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;

    tracing::info!("Starting WATA checkout backend");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!("WATA API: {}", config.provider.api_url);

    let (orders, webhook_log) = open_stores(&config).await?;
    let provider = Arc::new(WataProvider::new(WataConfig::from(&config.provider))?);

    let state = AppState::new(orders, webhook_log, provider, &config);
    let app = api::router(state, &config.server);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn open_stores(config: &Config) -> anyhow::Result<(Arc<dyn OrderStore>, Arc<dyn WebhookEventLog>)> {
    if config.database.in_memory {
        tracing::warn!("Using in-memory order store; orders are lost on restart");
        let store = Arc::new(InMemoryStore::new());
        let orders: Arc<dyn OrderStore> = store.clone();
        let webhook_log: Arc<dyn WebhookEventLog> = store;
        return Ok((orders, webhook_log));
    }

    let pool = database::init_pool(&config.database.url, Some(PoolConfig::from(&config.database)))
        .await
        .context("Failed to connect to database")?;
    schema::ensure_schema(&pool)
        .await
        .context("Failed to apply database schema")?;

    let orders: Arc<dyn OrderStore> = Arc::new(OrderRepository::new(pool.clone()));
    let webhook_log: Arc<dyn WebhookEventLog> = Arc::new(WebhookRepository::new(pool));
    Ok((orders, webhook_log))
}

/// `RUST_LOG` filters; `LOG_FORMAT=json` switches to JSON lines
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wata_checkout=debug"));

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}
