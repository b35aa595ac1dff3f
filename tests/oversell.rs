//! Concurrent checkouts never sell more than the unit holds.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use std::sync::Arc;

use proptest::prelude::*;

use commerce_fulfillment::auth::{Actor, Role};
use commerce_fulfillment::domain::{
    FulfillmentMethod, PaymentMethod, PurchaseItem, UserId,
};
use commerce_fulfillment::error::CommerceError;
use commerce_fulfillment::service::CheckoutRequest;
use commerce_fulfillment::store::CommerceStore;

fn buyer() -> Actor {
    Actor {
        user_id: UserId::new(),
        role: Role::Fan,
    }
}

/// Runs `quantities.len()` simultaneous checkouts against one unit and
/// returns (units sold, units left, tickets issued).
async fn race(stock: u32, quantities: Vec<u32>, tickets: bool, online: bool) -> (u32, u32, usize) {
    let h = common::harness();
    let item = if tickets {
        PurchaseItem::Ticket {
            ticket_type_id: h.ticket_type(stock).await.id,
        }
    } else {
        PurchaseItem::Product {
            product_id: h.product(1_500, stock).await.id,
        }
    };
    let payment_method = if online {
        PaymentMethod::Online
    } else {
        PaymentMethod::Cash
    };
    let service = Arc::clone(&h.state.service);

    let handles: Vec<_> = quantities
        .into_iter()
        .map(|quantity| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let request = CheckoutRequest {
                    item,
                    quantity,
                    payment_method,
                    fulfillment_method: FulfillmentMethod::Venue,
                    client_amount: None,
                };
                (quantity, service.checkout(&buyer(), request).await)
            })
        })
        .collect();

    let mut sold = 0;
    let mut issued = 0;
    for handle in handles {
        match handle.await.unwrap() {
            (quantity, Ok(receipt)) => {
                sold += quantity;
                issued += receipt.tickets.len();
            }
            (_, Err(CommerceError::InsufficientStock)) => {}
            (_, Err(other)) => panic!("unexpected checkout error: {other}"),
        }
    }

    let left = match item {
        PurchaseItem::Product { product_id } => {
            h.store.product(product_id).await.unwrap().unwrap().stock
        }
        PurchaseItem::Ticket { ticket_type_id } => {
            h.store
                .ticket_type(ticket_type_id)
                .await
                .unwrap()
                .unwrap()
                .remaining
        }
    };
    (sold, left, issued)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn concurrent_checkouts_never_oversell(
        stock in 0_u32..8,
        quantities in prop::collection::vec(1_u32..4, 1..12),
        tickets in any::<bool>(),
        online in any::<bool>(),
    ) {
        let (sold, left, issued) = runtime().block_on(race(stock, quantities, tickets, online));
        prop_assert!(sold <= stock);
        prop_assert_eq!(sold + left, stock);
        if tickets && !online {
            prop_assert_eq!(issued, sold as usize);
        } else {
            prop_assert_eq!(issued, 0);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_unit_goes_to_exactly_one_buyer() {
    let (sold, left, _) = race(1, vec![1, 1], false, false).await;
    assert_eq!(sold, 1);
    assert_eq!(left, 0);
}

#[tokio::test]
async fn line_item_price_survives_catalog_edit() {
    let h = common::harness();
    let product = h.product(1_500, 3).await;
    let receipt = h
        .state
        .service
        .checkout(
            &buyer(),
            CheckoutRequest {
                item: PurchaseItem::Product {
                    product_id: product.id,
                },
                quantity: 2,
                payment_method: PaymentMethod::Cash,
                fulfillment_method: FulfillmentMethod::Venue,
                client_amount: Some(commerce_fulfillment::domain::Yen::new(1)),
            },
        )
        .await
        .unwrap();
    h.store
        .set_product_price(product.id, commerce_fulfillment::domain::Yen::new(9_999))
        .await
        .unwrap();

    let stored = h
        .store
        .find_order(receipt.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.total.get(), 3_000);
    let Some(line) = stored.line_items.first() else {
        panic!("order has no line item");
    };
    assert_eq!(line.unit_price.get(), 1_500);
}
