use crate::database::error::DatabaseError;
use sqlx::PgPool;
use tracing::info;

pub const ORDER_NUMBER_CONSTRAINT: &str = "orders_order_number_unique";
pub const PROVIDER_ORDER_ID_CONSTRAINT: &str = "orders_wata_order_id_unique";
pub const IDEMPOTENCY_KEY_CONSTRAINT: &str = "orders_idempotency_key_unique";

/// Idempotent DDL, safe to run on every start
const SCHEMA: &str = r#"
DO $$ BEGIN
    CREATE TYPE order_status AS ENUM ('pending', 'paid', 'failed');
EXCEPTION
    WHEN duplicate_object THEN NULL;
END $$;

CREATE TABLE IF NOT EXISTS orders (
    id                  BIGSERIAL PRIMARY KEY,
    order_number        TEXT NOT NULL,
    user_name           TEXT NOT NULL,
    user_email          TEXT NOT NULL,
    user_phone          TEXT NOT NULL,
    delivery_address    TEXT,
    order_comment       TEXT,
    amount              NUMERIC(12, 2) NOT NULL CHECK (amount > 0),
    currency            TEXT NOT NULL DEFAULT 'RUB',
    wata_order_id       BIGINT,
    wata_transaction_id TEXT,
    status              order_status NOT NULL DEFAULT 'pending',
    payment_url         TEXT,
    failure_reason      TEXT,
    idempotency_key     TEXT,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    paid_at             TIMESTAMPTZ,
    CONSTRAINT orders_order_number_unique UNIQUE (order_number),
    CONSTRAINT orders_wata_order_id_unique UNIQUE (wata_order_id),
    CONSTRAINT orders_idempotency_key_unique UNIQUE (idempotency_key),
    CONSTRAINT orders_paid_at_matches_status CHECK (paid_at IS NULL OR status = 'paid')
);

CREATE INDEX IF NOT EXISTS orders_status_created_at_idx ON orders (status, created_at);

CREATE TABLE IF NOT EXISTS order_items (
    id            BIGSERIAL PRIMARY KEY,
    order_id      BIGINT NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
    product_id    TEXT NOT NULL,
    product_name  TEXT NOT NULL,
    product_price NUMERIC(12, 2) NOT NULL CHECK (product_price > 0),
    quantity      INTEGER NOT NULL CHECK (quantity > 0)
);

CREATE INDEX IF NOT EXISTS order_items_order_id_idx ON order_items (order_id);

CREATE TABLE IF NOT EXISTS webhook_events (
    id                 BIGSERIAL PRIMARY KEY,
    provider           TEXT NOT NULL,
    transaction_id     TEXT NOT NULL,
    order_reference    TEXT NOT NULL,
    transaction_status TEXT NOT NULL,
    payload            JSONB NOT NULL,
    outcome            TEXT NOT NULL,
    order_id           BIGINT REFERENCES orders (id) ON DELETE SET NULL,
    created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS webhook_events_transaction_id_idx ON webhook_events (transaction_id);
"#;

pub async fn ensure_schema(pool: &PgPool) -> Result<(), DatabaseError> {
    info!("Ensuring database schema");
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e).with_context("schema bootstrap"))?;
    Ok(())
}
