//! Checkout: reserve stock, create the order, open the payment intent.

use tracing::{error, info, warn};

use super::CommerceService;
use crate::auth::Actor;
use crate::domain::{
    CancelReason, FulfillmentMethod, IssuedTicket, Order, PaymentMethod, PurchaseItem, UserId, Yen,
};
use crate::error::CommerceError;
use crate::store::OrderDraft;

/// A buyer's purchase request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// What to buy.
    pub item: PurchaseItem,
    /// How many units.
    pub quantity: u32,
    /// How the buyer pays.
    pub payment_method: PaymentMethod,
    /// How the purchase is delivered.
    pub fulfillment_method: FulfillmentMethod,
    /// Amount the client believes it owes. Logged when it disagrees, never used.
    pub client_amount: Option<Yen>,
}

/// Outcome of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutReceipt {
    /// The created order.
    pub order: Order,
    /// Tickets issued at checkout (cash ticket purchases only).
    pub tickets: Vec<IssuedTicket>,
    /// Secret for completing an online payment.
    pub client_secret: Option<String>,
}

impl CheckoutRequest {
    fn validate(&self, max_quantity: u32) -> Result<(), CommerceError> {
        if self.quantity == 0 || self.quantity > max_quantity {
            return Err(CommerceError::InvalidRequest(format!(
                "quantity must be between 1 and {max_quantity}"
            )));
        }
        match (self.item, self.payment_method, self.fulfillment_method) {
            (PurchaseItem::Ticket { .. }, _, FulfillmentMethod::Mail) => Err(
                CommerceError::InvalidRequest("tickets are redeemed at the venue".into()),
            ),
            (_, PaymentMethod::Cash, FulfillmentMethod::Mail) => Err(CommerceError::InvalidRequest(
                "cash payment requires venue pickup".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl CommerceService {
    /// Places an order for `actor`.
    ///
    /// Stock is decremented and the order created in one transaction. For
    /// online payment a processor intent is then opened for the
    /// server-computed total; if that fails the reservation is released and
    /// the upstream error returned so the buyer can retry.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::InvalidRequest`] for malformed requests,
    /// [`CommerceError::Forbidden`] when the seller tries to buy their own
    /// listing, [`CommerceError::InsufficientStock`],
    /// [`CommerceError::MissingShippingAddress`] and
    /// [`CommerceError::NotFound`] from the store, and the broker's upstream
    /// errors for online payments.
    pub async fn checkout(
        &self,
        actor: &Actor,
        request: CheckoutRequest,
    ) -> Result<CheckoutReceipt, CommerceError> {
        request.validate(self.settings.max_quantity_per_order)?;
        if self.listing_seller(request.item).await? == Some(actor.user_id) {
            return Err(CommerceError::Forbidden(
                "sellers cannot buy their own listings".into(),
            ));
        }

        let draft = OrderDraft {
            buyer_id: actor.user_id,
            item: request.item,
            quantity: request.quantity,
            payment_method: request.payment_method,
            fulfillment_method: request.fulfillment_method,
            fee_bps: self.settings.platform_fee_bps,
        };
        let placed = self.store.place_order(draft).await?;
        let mut order = placed.order;
        info!(
            order_id = %order.id,
            buyer_id = %order.buyer_id,
            total = %order.total,
            payment = order.payment_method.as_str(),
            fulfillment = order.fulfillment_method.as_str(),
            "order placed"
        );
        if let Some(claimed) = request.client_amount
            && claimed != order.total
        {
            warn!(order_id = %order.id, %claimed, total = %order.total, "client amount ignored");
        }

        if order.payment_method == PaymentMethod::Cash {
            return Ok(CheckoutReceipt {
                order,
                tickets: placed.tickets,
                client_secret: None,
            });
        }

        let intent = match self.broker.open_intent(&order).await {
            Ok(intent) => intent,
            Err(e) => {
                match self
                    .store
                    .release_order(order.id, CancelReason::PaymentNotStarted)
                    .await
                {
                    Ok(Some(released)) => {
                        info!(
                            order_id = %released.id,
                            "reservation released after payment setup failure"
                        );
                        self.mirror(&released, &[]);
                    }
                    Ok(None) => {}
                    Err(release_err) => {
                        error!(
                            order_id = %order.id,
                            error = %release_err,
                            "failed to release reservation; sweeper will retry"
                        );
                    }
                }
                return Err(e);
            }
        };
        self.store
            .attach_payment_intent(order.id, &intent.id)
            .await?;
        order.payment_intent_id = Some(intent.id);

        Ok(CheckoutReceipt {
            order,
            tickets: placed.tickets,
            client_secret: Some(intent.client_secret),
        })
    }

    async fn listing_seller(&self, item: PurchaseItem) -> Result<Option<UserId>, CommerceError> {
        Ok(match item {
            PurchaseItem::Product { product_id } => {
                self.store.product(product_id).await?.map(|p| p.seller_id)
            }
            PurchaseItem::Ticket { ticket_type_id } => self
                .store
                .ticket_type(ticket_type_id)
                .await?
                .map(|t| t.seller_id),
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::domain::{OrderStatus, SeatingMode};
    use crate::payment::StubBehavior;
    use crate::service::testing::{actor, address, fixture};
    use crate::store::CommerceStore;

    fn request(item: PurchaseItem, quantity: u32) -> CheckoutRequest {
        CheckoutRequest {
            item,
            quantity,
            payment_method: PaymentMethod::Online,
            fulfillment_method: FulfillmentMethod::Venue,
            client_amount: None,
        }
    }

    #[tokio::test]
    async fn total_is_computed_server_side() {
        let fx = fixture(StubBehavior::Succeed);
        let product = fx.product(1_500, 5).await;
        let buyer = actor(Role::Fan);
        let mut req = request(PurchaseItem::Product { product_id: product.id }, 2);
        req.client_amount = Some(Yen::new(1));

        let receipt = fx.service.checkout(&buyer, req).await.unwrap();

        assert_eq!(receipt.order.total, Yen::new(3_000));
        assert!(receipt.client_secret.is_some());
        let requests = fx.processor.requests().await;
        assert_eq!(requests.first().map(|r| r.amount), Some(Yen::new(3_000)));
        let stored = fx.store.find_order(receipt.order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_intent_id, receipt.order.payment_intent_id);
    }

    #[tokio::test]
    async fn seller_cannot_buy_own_listing() {
        let fx = fixture(StubBehavior::Succeed);
        let product = fx.product(1_500, 5).await;
        let tt = fx.ticket_type(5, SeatingMode::Assigned).await;

        for item in [
            PurchaseItem::Product { product_id: product.id },
            PurchaseItem::Ticket { ticket_type_id: tt.id },
        ] {
            let err = fx.service.checkout(&fx.seller, request(item, 1)).await.unwrap_err();
            assert!(matches!(err, CommerceError::Forbidden(_)));
        }
        assert_eq!(fx.store.product(product.id).await.unwrap().unwrap().stock, 5);
        assert!(fx.processor.requests().await.is_empty());

        let admin = actor(Role::Admin);
        let item = PurchaseItem::Product { product_id: product.id };
        assert!(fx.service.checkout(&admin, request(item, 1)).await.is_ok());
    }

    #[tokio::test]
    async fn processor_failure_releases_reservation() {
        let fx = fixture(StubBehavior::Reject);
        let product = fx.product(2_000, 1).await;
        let buyer = actor(Role::Fan);

        let err = fx
            .service
            .checkout(&buyer, request(PurchaseItem::Product { product_id: product.id }, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, CommerceError::UpstreamPaymentFailure(_)));
        assert!(err.is_retryable());
        assert_eq!(fx.store.product(product.id).await.unwrap().unwrap().stock, 1);
    }

    #[tokio::test]
    async fn processor_timeout_releases_reservation() {
        let fx = fixture(StubBehavior::Hang);
        let tt = fx.ticket_type(1, SeatingMode::Open).await;
        let buyer = actor(Role::Fan);

        let err = fx
            .service
            .checkout(&buyer, request(PurchaseItem::Ticket { ticket_type_id: tt.id }, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, CommerceError::UpstreamTimeout));
        assert_eq!(fx.store.ticket_type(tt.id).await.unwrap().unwrap().remaining, 1);
    }

    #[tokio::test]
    async fn cash_skips_the_processor() {
        let fx = fixture(StubBehavior::Succeed);
        let tt = fx.ticket_type(4, SeatingMode::Assigned).await;
        let buyer = actor(Role::Fan);
        let mut req = request(PurchaseItem::Ticket { ticket_type_id: tt.id }, 2);
        req.payment_method = PaymentMethod::Cash;

        let receipt = fx.service.checkout(&buyer, req).await.unwrap();

        assert_eq!(receipt.order.status, OrderStatus::Pending);
        assert_eq!(receipt.client_secret, None);
        assert_eq!(receipt.tickets.len(), 2);
        assert!(fx.processor.requests().await.is_empty());
    }

    #[tokio::test]
    async fn mail_checkout_snapshots_address() {
        let fx = fixture(StubBehavior::Succeed);
        let product = fx.product(4_200, 2).await;
        let buyer = actor(Role::Fan);
        let mut req = request(PurchaseItem::Product { product_id: product.id }, 1);
        req.fulfillment_method = FulfillmentMethod::Mail;

        let err = fx.service.checkout(&buyer, req.clone()).await.unwrap_err();
        assert!(matches!(err, CommerceError::MissingShippingAddress));

        fx.store
            .put_shipping_address(buyer.user_id, address())
            .await
            .unwrap();
        let receipt = fx.service.checkout(&buyer, req).await.unwrap();
        let Some(snapshot) = receipt.order.shipping else {
            panic!("mail order must carry a shipping snapshot");
        };
        assert_eq!(snapshot.address.city, "Kita");
    }

    #[tokio::test]
    async fn rejects_invalid_combinations() {
        let fx = fixture(StubBehavior::Succeed);
        let product = fx.product(1_000, 50).await;
        let tt = fx.ticket_type(50, SeatingMode::Open).await;
        let buyer = actor(Role::Fan);

        let zero = request(PurchaseItem::Product { product_id: product.id }, 0);
        let too_many = request(PurchaseItem::Product { product_id: product.id }, 11);
        let mut mailed_ticket = request(PurchaseItem::Ticket { ticket_type_id: tt.id }, 1);
        mailed_ticket.fulfillment_method = FulfillmentMethod::Mail;
        let mut cash_mail = request(PurchaseItem::Product { product_id: product.id }, 1);
        cash_mail.payment_method = PaymentMethod::Cash;
        cash_mail.fulfillment_method = FulfillmentMethod::Mail;

        for req in [zero, too_many, mailed_ticket, cash_mail] {
            let err = fx.service.checkout(&buyer, req).await.unwrap_err();
            assert!(matches!(err, CommerceError::InvalidRequest(_)), "got {err:?}");
        }
        assert_eq!(fx.store.product(product.id).await.unwrap().unwrap().stock, 50);
    }
}
