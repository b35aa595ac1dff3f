//! Store behavior against a real PostgreSQL instance.
//!
//! Every test returns early when `DATABASE_URL` is unset. Point it at a
//! scratch database to exercise the row locks and conditional updates:
//! `DATABASE_URL=postgres://… cargo test --test postgres_store`

#![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;

use commerce_fulfillment::auth::{Actor, Role};
use commerce_fulfillment::domain::{
    EventId, FulfillmentMethod, OrderStatus, PaymentMethod, Product, ProductId, PurchaseItem,
    SeatingMode, TicketType, UserId, Yen,
};
use commerce_fulfillment::error::CommerceError;
use commerce_fulfillment::payment::{
    CorrelationMetadata, PaymentBroker, PaymentProcessor, StubBehavior, StubPaymentProcessor,
};
use commerce_fulfillment::service::{
    CheckoutRequest, CommerceService, CommerceSettings, NotificationOutcome,
};
use commerce_fulfillment::store::{
    CommerceStore, ConfirmationOutcome, OrderDraft, PaymentConfirmation, PostgresStore,
};
use commerce_fulfillment::sync::StatusPublisher;
use commerce_fulfillment::webhook::PaymentNotification;

async fn store() -> Option<Arc<PostgresStore>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(&url)
        .await
        .unwrap();
    let store = PostgresStore::new(pool);
    store.migrate().await.unwrap();
    Some(Arc::new(store))
}

fn service(store: &Arc<PostgresStore>) -> CommerceService {
    let processor: Arc<dyn PaymentProcessor> =
        Arc::new(StubPaymentProcessor::new(StubBehavior::Succeed));
    CommerceService::new(
        Arc::clone(store) as Arc<dyn CommerceStore>,
        PaymentBroker::new(processor, "jpy", Duration::from_secs(2)),
        StatusPublisher::new(Vec::new(), 1, Duration::from_millis(1)),
        CommerceSettings::default(),
    )
}

fn draft(item: PurchaseItem, payment_method: PaymentMethod) -> OrderDraft {
    OrderDraft {
        buyer_id: UserId::new(),
        item,
        quantity: 1,
        payment_method,
        fulfillment_method: FulfillmentMethod::Venue,
        fee_bps: 1_000,
    }
}

async fn ticket_type(store: &PostgresStore, capacity: u32) -> TicketType {
    let tt = TicketType::new(
        EventId::new(),
        UserId::new(),
        "B席",
        Yen::new(5_000),
        capacity,
        SeatingMode::Assigned,
    );
    store.put_ticket_type(tt.clone()).await.unwrap();
    tt
}

async fn product(store: &PostgresStore, stock: u32) -> Product {
    let product = Product {
        id: ProductId::new(),
        seller_id: UserId::new(),
        name: "Poster".into(),
        price: Yen::new(1_500),
        stock,
    };
    store.put_product(product.clone()).await.unwrap();
    product
}

#[tokio::test]
async fn row_locks_serialize_the_last_unit() {
    let Some(store) = store().await else {
        return;
    };
    let product = product(&store, 3).await;
    let item = PurchaseItem::Product {
        product_id: product.id,
    };

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.place_order(draft(item, PaymentMethod::Cash)).await })
        })
        .collect();
    let mut sold = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => sold += 1,
            Err(CommerceError::InsufficientStock) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(sold, 3);
    assert_eq!(store.product(product.id).await.unwrap().unwrap().stock, 0);
}

#[tokio::test]
async fn last_seat_goes_to_exactly_one_buyer() {
    let Some(store) = store().await else {
        return;
    };
    let tt = ticket_type(&store, 1).await;
    let item = PurchaseItem::Ticket {
        ticket_type_id: tt.id,
    };

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.place_order(draft(item, PaymentMethod::Online)).await })
        })
        .collect();
    let (mut won, mut lost) = (0, 0);
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(CommerceError::InsufficientStock) => lost += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((won, lost), (1, 7));
    assert_eq!(store.ticket_type(tt.id).await.unwrap().unwrap().remaining, 0);
}

#[tokio::test]
async fn concurrent_confirmations_issue_once() {
    let Some(store) = store().await else {
        return;
    };
    let tt = ticket_type(&store, 5).await;
    let placed = store
        .place_order(draft(
            PurchaseItem::Ticket {
                ticket_type_id: tt.id,
            },
            PaymentMethod::Online,
        ))
        .await
        .unwrap();
    let reference = format!("pi_{}", uuid::Uuid::new_v4().simple());

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let store = Arc::clone(&store);
            let confirmation = PaymentConfirmation {
                order_id: placed.order.id,
                processor_reference: reference.clone(),
                amount: Some(placed.order.total),
            };
            tokio::spawn(async move { store.confirm_payment(confirmation).await })
        })
        .collect();
    let mut confirmed = 0;
    for handle in handles {
        if let ConfirmationOutcome::Confirmed { .. } = handle.await.unwrap().unwrap() {
            confirmed += 1;
        }
    }
    assert_eq!(confirmed, 1);
    assert_eq!(store.tickets_for_order(placed.order.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn replayed_webhook_issues_once() {
    let Some(store) = store().await else {
        return;
    };
    let service = Arc::new(service(&store));
    let tt = ticket_type(&store, 10).await;
    let buyer = Actor {
        user_id: UserId::new(),
        role: Role::Fan,
    };
    let order = service
        .checkout(
            &buyer,
            CheckoutRequest {
                item: PurchaseItem::Ticket {
                    ticket_type_id: tt.id,
                },
                quantity: 2,
                payment_method: PaymentMethod::Online,
                fulfillment_method: FulfillmentMethod::Venue,
                client_amount: None,
            },
        )
        .await
        .unwrap()
        .order;
    let body = json!({
        "type": "payment_intent.succeeded",
        "data": {"object": {
            "id": order.payment_intent_id.clone().unwrap(),
            "amount": order.total.get(),
            "currency": "jpy",
            "metadata": CorrelationMetadata::for_order(&order).unwrap().to_map(),
        }}
    });

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let service = Arc::clone(&service);
            let mut body = body.clone();
            body["id"] = json!(format!("evt_{i}"));
            tokio::spawn(async move {
                let notification: PaymentNotification = serde_json::from_value(body).unwrap();
                service.handle_payment_notification(notification).await
            })
        })
        .collect();
    let mut confirmed = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            NotificationOutcome::Confirmed { tickets_issued, .. } => {
                assert_eq!(tickets_issued, 2);
                confirmed += 1;
            }
            NotificationOutcome::NoChange => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(confirmed, 1);
    let stored = store.find_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
    assert_eq!(store.tickets_for_order(order.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_ticket_scans_redeem_once() {
    let Some(store) = store().await else {
        return;
    };
    let tt = ticket_type(&store, 5).await;
    let placed = store
        .place_order(draft(
            PurchaseItem::Ticket {
                ticket_type_id: tt.id,
            },
            PaymentMethod::Cash,
        ))
        .await
        .unwrap();
    let Some(ticket) = placed.tickets.first() else {
        panic!("cash ticket orders issue at checkout");
    };
    let staff = UserId::new();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let store = Arc::clone(&store);
            let id = ticket.id;
            tokio::spawn(async move { store.redeem_ticket(id, staff, Utc::now()).await })
        })
        .collect();
    let mut scans = Vec::new();
    for handle in handles {
        if let Some(scan) = handle.await.unwrap().unwrap() {
            scans.push(scan);
        }
    }
    let [scan] = scans.as_slice() else {
        panic!("expected exactly one successful scan, got {}", scans.len());
    };
    assert_eq!(scan.ticket.used_by, Some(staff));
    let Some(order) = &scan.completed_order else {
        panic!("the only ticket completes the order");
    };
    assert_eq!(order.status, OrderStatus::Redeemed);
}

#[tokio::test]
async fn concurrent_order_scans_redeem_once() {
    let Some(store) = store().await else {
        return;
    };
    let product = product(&store, 1).await;
    let placed = store
        .place_order(draft(
            PurchaseItem::Product {
                product_id: product.id,
            },
            PaymentMethod::Cash,
        ))
        .await
        .unwrap();
    let staff = UserId::new();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let store = Arc::clone(&store);
            let id = placed.order.id;
            tokio::spawn(async move { store.redeem_order(id, staff, Utc::now()).await })
        })
        .collect();
    let mut redeemed = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_some() {
            redeemed += 1;
        }
    }
    assert_eq!(redeemed, 1);
    let stored = store.find_order(placed.order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Redeemed);
    assert_eq!(stored.redeemed_by, Some(staff));
}
