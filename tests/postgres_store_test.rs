//! Postgres-backed store tests
//!
//! Need a disposable database: `DATABASE_URL=postgres://... cargo test -- --ignored`

use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;
use wata_checkout::database::schema::{ensure_schema, PROVIDER_ORDER_ID_CONSTRAINT};
use wata_checkout::database::webhook_repository::NewWebhookEvent;
use wata_checkout::database::{
    init_pool, OrderRepository, OrderStore, StatusChange, WebhookEventLog, WebhookRepository,
};
use wata_checkout::orders::models::{NewOrder, NewOrderItem, OrderIdentifiers, OrderReference, Payer};
use wata_checkout::orders::OrderStatus;

async fn repositories() -> (OrderRepository, WebhookRepository) {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    let pool = init_pool(&url, None).await.unwrap();
    ensure_schema(&pool).await.unwrap();
    (OrderRepository::new(pool.clone()), WebhookRepository::new(pool))
}

fn new_order() -> NewOrder {
    let ids = OrderIdentifiers::generate("TEST", Utc::now());
    NewOrder {
        order_number: ids.order_number,
        provider_order_id: ids.provider_order_id,
        payer: Payer {
            name: "Anna".into(),
            email: "anna@example.ru".into(),
            phone: "79001234567".into(),
            address: Some("Moscow".into()),
        },
        comment: None,
        amount: dec!(1500.00),
        currency: "RUB".into(),
        idempotency_key: None,
        items: vec![
            NewOrderItem {
                product_id: "1".into(),
                name: "Kettle".into(),
                unit_price: dec!(1000.00),
                quantity: 1,
            },
            NewOrderItem {
                product_id: "2".into(),
                name: "Mug".into(),
                unit_price: dec!(250.00),
                quantity: 2,
            },
        ],
    }
}

#[tokio::test]
#[ignore]
async fn test_insert_and_lookup() {
    let (orders, _) = repositories().await;
    let new_order = new_order();
    let order = orders.insert_pending(&new_order).await.unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.amount, dec!(1500.00));
    assert_eq!(orders.items(order.id).await.unwrap().len(), 2);

    let by_ref = orders
        .find_by_reference(&OrderReference::ProviderOrderId(new_order.provider_order_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_ref.id, order.id);

    let by_number = orders
        .find_by_reference(&OrderReference::OrderNumber(new_order.order_number.clone()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_number.id, order.id);
}

#[tokio::test]
#[ignore]
async fn test_duplicate_provider_order_id_names_constraint() {
    let (orders, _) = repositories().await;
    let first = new_order();
    orders.insert_pending(&first).await.unwrap();

    let mut second = new_order();
    second.provider_order_id = first.provider_order_id;
    let err = orders.insert_pending(&second).await.unwrap_err();
    assert_eq!(err.unique_violation(), Some(PROVIDER_ORDER_ID_CONSTRAINT));
    // Nothing from the failed transaction is left behind
    assert!(orders
        .find_by_reference(&OrderReference::OrderNumber(second.order_number))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore]
async fn test_concurrent_transitions_single_winner() {
    let (orders, _) = repositories().await;
    let orders = Arc::new(orders);
    let order = orders.insert_pending(&new_order()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let orders = orders.clone();
        let order_id = order.id;
        handles.push(tokio::spawn(async move {
            let change = StatusChange {
                order_id,
                to: if i % 2 == 0 { OrderStatus::Paid } else { OrderStatus::Failed },
                provider_transaction_id: Some("tx-pg"),
                failure_reason: None,
                at: Utc::now(),
            };
            orders.transition(&change).await.unwrap().is_some()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let stored = orders.find_by_id(order.id).await.unwrap().unwrap();
    assert!(stored.status.is_terminal());
    assert_eq!(stored.provider_transaction_id.as_deref(), Some("tx-pg"));
    assert_eq!(stored.paid_at.is_some(), stored.status == OrderStatus::Paid);
}

#[tokio::test]
#[ignore]
async fn test_payment_link_and_audit_log() {
    let (orders, events) = repositories().await;
    let order = orders.insert_pending(&new_order()).await.unwrap();

    let linked = orders
        .attach_payment_link(order.id, "https://pay.example/1", Some("tx-link"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(linked.payment_url.as_deref(), Some("https://pay.example/1"));
    assert!(orders
        .attach_payment_link(order.id, "https://pay.example/2", None)
        .await
        .unwrap()
        .is_none());

    let transaction_id = format!("tx-audit-{}", order.id);
    events
        .record(&NewWebhookEvent {
            provider: "WATA".into(),
            transaction_id: transaction_id.clone(),
            order_reference: order.order_number.clone(),
            transaction_status: "Paid".into(),
            payload: serde_json::json!({ "transactionId": transaction_id }),
            outcome: "applied".into(),
            order_id: Some(order.id),
        })
        .await
        .unwrap();
    let recorded = events.find_by_transaction(&transaction_id).await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].order_id, Some(order.id));
}
