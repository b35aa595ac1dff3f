//! Service layer: the commerce flows.
//!
//! [`CommerceService`] coordinates the store, the payment broker, and the
//! status publisher. Each flow lives in its own module as an `impl` block:
//! checkout, payment notifications, redemption, fulfillment (ship, cancel,
//! refund, read), and the reservation sweeper.

pub mod checkout;
pub mod confirmation;
pub mod fulfillment;
pub mod redemption;
pub mod sweeper;

use std::sync::Arc;

use crate::domain::{IssuedTicket, Order, OrderStatus, StatusDocument};
use crate::payment::PaymentBroker;
use crate::store::CommerceStore;
use crate::sync::StatusPublisher;

pub use checkout::{CheckoutReceipt, CheckoutRequest};
pub use confirmation::NotificationOutcome;
pub use fulfillment::OrderView;
pub use redemption::RedemptionReceipt;
pub use sweeper::spawn_reservation_sweeper;

/// Tunables for the commerce flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommerceSettings {
    /// Platform commission in basis points of the order total.
    pub platform_fee_bps: u32,
    /// Largest quantity a single checkout may request.
    pub max_quantity_per_order: u32,
    /// Seconds an online order may stay unpaid before its stock is released.
    pub reservation_ttl_secs: i64,
}

impl Default for CommerceSettings {
    fn default() -> Self {
        Self {
            platform_fee_bps: 1_000,
            max_quantity_per_order: 10,
            reservation_ttl_secs: 1_800,
        }
    }
}

/// Orchestration layer for all commerce operations.
///
/// Every mutation follows the same pattern: validate → one store
/// transaction → log → hand status documents to the publisher. The
/// publisher runs after commit and its outcome never affects the caller.
#[derive(Debug, Clone)]
pub struct CommerceService {
    store: Arc<dyn CommerceStore>,
    broker: PaymentBroker,
    publisher: StatusPublisher,
    settings: CommerceSettings,
}

impl CommerceService {
    /// Creates a new `CommerceService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn CommerceStore>,
        broker: PaymentBroker,
        publisher: StatusPublisher,
        settings: CommerceSettings,
    ) -> Self {
        Self {
            store,
            broker,
            publisher,
            settings,
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CommerceStore> {
        &self.store
    }

    /// Returns the configured settings.
    #[must_use]
    pub fn settings(&self) -> &CommerceSettings {
        &self.settings
    }

    fn mirror(&self, order: &Order, tickets: &[IssuedTicket]) {
        let documents = status_documents(order, tickets);
        if !documents.is_empty() {
            drop(self.publisher.publish(documents));
        }
    }
}

/// Status documents for every token an order exposes.
///
/// Tickets of a canceled or refunded order mirror the order's status.
fn status_documents(order: &Order, tickets: &[IssuedTicket]) -> Vec<StatusDocument> {
    let voided = matches!(order.status, OrderStatus::Canceled | OrderStatus::Refunded);
    StatusDocument::for_order(order)
        .into_iter()
        .chain(tickets.iter().map(|t| {
            let doc = StatusDocument::for_ticket(t);
            if voided {
                doc.superseded(order.status, order.updated_at)
            } else {
                doc
            }
        }))
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for service tests.

    use std::sync::Arc;
    use std::time::Duration;

    use super::{CommerceService, CommerceSettings};
    use crate::auth::{Actor, Role};
    use crate::domain::{
        EventBus, EventId, Product, ProductId, SeatingMode, ShippingAddress, TicketType, UserId,
        Yen,
    };
    use crate::payment::{PaymentBroker, PaymentProcessor, StubBehavior, StubPaymentProcessor};
    use crate::store::{CommerceStore, MemoryStore};
    use crate::sync::{ChannelMirror, StatusMirror, StatusPublisher};

    pub(crate) struct Fixture {
        pub service: CommerceService,
        pub store: Arc<MemoryStore>,
        pub processor: Arc<StubPaymentProcessor>,
        pub bus: EventBus,
        pub seller: Actor,
    }

    pub(crate) fn actor(role: Role) -> Actor {
        Actor {
            user_id: UserId::new(),
            role,
        }
    }

    pub(crate) fn address() -> ShippingAddress {
        ShippingAddress {
            recipient: "Ren Sato".into(),
            postal_code: "530-0001".into(),
            region: "Osaka".into(),
            city: "Kita".into(),
            line1: "4-5-6 Umeda".into(),
            line2: Some("Room 802".into()),
            phone: None,
        }
    }

    pub(crate) fn fixture(behavior: StubBehavior) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let processor = Arc::new(StubPaymentProcessor::new(behavior));
        let bus = EventBus::new(64);
        let broker = PaymentBroker::new(
            Arc::clone(&processor) as Arc<dyn PaymentProcessor>,
            "jpy",
            Duration::from_millis(50),
        );
        let publisher = StatusPublisher::new(
            vec![Arc::new(ChannelMirror::new(bus.clone())) as Arc<dyn StatusMirror>],
            1,
            Duration::from_millis(1),
        );
        let service = CommerceService::new(
            Arc::clone(&store) as Arc<dyn CommerceStore>,
            broker,
            publisher,
            CommerceSettings::default(),
        );
        Fixture {
            service,
            store,
            processor,
            bus,
            seller: actor(Role::Artist),
        }
    }

    impl Fixture {
        pub(crate) async fn product(&self, price: i64, stock: u32) -> Product {
            let product = Product {
                id: ProductId::new(),
                seller_id: self.seller.user_id,
                name: "Acrylic Stand".into(),
                price: Yen::new(price),
                stock,
            };
            let _ = self.store.put_product(product.clone()).await;
            product
        }

        pub(crate) async fn ticket_type(&self, capacity: u32, seating: SeatingMode) -> TicketType {
            let tt = TicketType::new(
                EventId::new(),
                self.seller.user_id,
                "A席",
                Yen::new(6_500),
                capacity,
                seating,
            );
            let _ = self.store.put_ticket_type(tt.clone()).await;
            tt
        }
    }
}
