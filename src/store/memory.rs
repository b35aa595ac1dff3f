//! In-process store for tests and single-instance development.
//!
//! All tables live behind one [`tokio::sync::Mutex`]; holding the lock for
//! the whole operation makes each trait method a serializable transaction.
//! This is only sound within a single process. Deployments running more
//! than one instance must use [`super::PostgresStore`].

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{
    CommerceStore, ConfirmationOutcome, OrderDraft, PaymentConfirmation, PlacedOrder,
    TicketRedemption, TokenTarget, UnitSnapshot, admits_entry, build_order, issues_at_checkout,
    redeemable, releasable,
};
use crate::domain::ticket;
use crate::domain::{
    CancelReason, FulfillmentMethod, IssuedTicket, Order, OrderId, OrderKind, OrderStatus,
    PaymentMethod, Product, ProductId, PurchaseItem, RedemptionToken, ShippingAddress,
    ShippingSnapshot, TicketId, TicketType, TicketTypeId, Tracking, UserId, Yen,
};
use crate::error::CommerceError;

#[derive(Debug, Clone, Copy)]
enum TokenOwner {
    Order(OrderId),
    Ticket(TicketId),
}

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    ticket_types: HashMap<TicketTypeId, TicketType>,
    addresses: HashMap<UserId, ShippingAddress>,
    orders: HashMap<OrderId, Order>,
    tickets: Vec<IssuedTicket>,
    tokens: HashMap<RedemptionToken, TokenOwner>,
    confirmations: HashSet<String>,
}

impl Tables {
    fn insert_order(&mut self, order: Order) {
        if let Some(token) = &order.redemption_token {
            self.tokens.insert(token.clone(), TokenOwner::Order(order.id));
        }
        self.orders.insert(order.id, order);
    }

    fn insert_tickets(&mut self, tickets: &[IssuedTicket]) {
        for t in tickets {
            self.tokens
                .insert(t.redemption_token.clone(), TokenOwner::Ticket(t.id));
            self.tickets.push(t.clone());
        }
    }

    fn restock(&mut self, order: &Order) {
        for li in &order.line_items {
            if let Some(pid) = li.product_id
                && let Some(product) = self.products.get_mut(&pid)
            {
                product.stock = product.stock.saturating_add(li.quantity);
            }
            if let Some(tid) = li.ticket_type_id
                && let Some(tt) = self.ticket_types.get_mut(&tid)
            {
                tt.remaining = tt.remaining.saturating_add(li.quantity).min(tt.capacity);
            }
        }
    }

    fn release(&mut self, id: OrderId, reason: CancelReason) -> Option<Order> {
        let now = Utc::now();
        let order = self.orders.get_mut(&id).filter(|o| releasable(o))?;
        order.status = OrderStatus::Canceled;
        order.cancel_reason = Some(reason);
        order.updated_at = now;
        let released = order.clone();
        self.restock(&released);
        Some(released)
    }

    fn has_used_tickets(&self, id: OrderId) -> bool {
        self.tickets.iter().any(|t| t.order_id == id && t.used)
    }
}

/// [`CommerceStore`] backed by in-process hash maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommerceStore for MemoryStore {
    async fn put_product(&self, product: Product) -> Result<(), CommerceError> {
        self.tables.lock().await.products.insert(product.id, product);
        Ok(())
    }

    async fn put_ticket_type(&self, ticket_type: TicketType) -> Result<(), CommerceError> {
        self.tables
            .lock()
            .await
            .ticket_types
            .insert(ticket_type.id, ticket_type);
        Ok(())
    }

    async fn set_product_price(&self, id: ProductId, price: Yen) -> Result<(), CommerceError> {
        let mut t = self.tables.lock().await;
        let product = t
            .products
            .get_mut(&id)
            .ok_or(CommerceError::NotFound("product"))?;
        product.price = price;
        Ok(())
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, CommerceError> {
        Ok(self.tables.lock().await.products.get(&id).cloned())
    }

    async fn ticket_type(&self, id: TicketTypeId) -> Result<Option<TicketType>, CommerceError> {
        Ok(self.tables.lock().await.ticket_types.get(&id).cloned())
    }

    async fn put_shipping_address(
        &self,
        user_id: UserId,
        address: ShippingAddress,
    ) -> Result<(), CommerceError> {
        self.tables.lock().await.addresses.insert(user_id, address);
        Ok(())
    }

    async fn shipping_address(
        &self,
        user_id: UserId,
    ) -> Result<Option<ShippingAddress>, CommerceError> {
        Ok(self.tables.lock().await.addresses.get(&user_id).cloned())
    }

    async fn place_order(&self, draft: OrderDraft) -> Result<PlacedOrder, CommerceError> {
        let mut t = self.tables.lock().await;
        let now = Utc::now();

        let shipping = if draft.fulfillment_method.requires_shipping() {
            let address = t
                .addresses
                .get(&draft.buyer_id)
                .cloned()
                .ok_or(CommerceError::MissingShippingAddress)?;
            Some(ShippingSnapshot {
                address,
                captured_at: now,
            })
        } else {
            None
        };

        let (order, tickets) = match draft.item {
            PurchaseItem::Product { product_id } => {
                let product = t
                    .products
                    .get_mut(&product_id)
                    .ok_or(CommerceError::NotFound("product"))?;
                if product.stock < draft.quantity {
                    return Err(CommerceError::InsufficientStock);
                }
                let unit = UnitSnapshot {
                    seller_id: product.seller_id,
                    name: product.name.clone(),
                    price: product.price,
                };
                let order = build_order(&draft, &unit, shipping, now)?;
                product.stock -= draft.quantity;
                (order, Vec::new())
            }
            PurchaseItem::Ticket { ticket_type_id } => {
                let tt = t
                    .ticket_types
                    .get_mut(&ticket_type_id)
                    .ok_or(CommerceError::NotFound("ticket type"))?;
                if tt.remaining < draft.quantity {
                    return Err(CommerceError::InsufficientStock);
                }
                let unit = UnitSnapshot {
                    seller_id: tt.seller_id,
                    name: tt.name.clone(),
                    price: tt.price,
                };
                let order = build_order(&draft, &unit, shipping, now)?;
                tt.remaining -= draft.quantity;
                let tickets = if issues_at_checkout(&order) {
                    ticket::mint(tt, order.id, order.buyer_id, draft.quantity, None, now)
                } else {
                    Vec::new()
                };
                (order, tickets)
            }
        };

        t.insert_order(order.clone());
        t.insert_tickets(&tickets);
        Ok(PlacedOrder { order, tickets })
    }

    async fn attach_payment_intent(
        &self,
        order_id: OrderId,
        intent_id: &str,
    ) -> Result<(), CommerceError> {
        let mut t = self.tables.lock().await;
        let order = t
            .orders
            .get_mut(&order_id)
            .ok_or(CommerceError::NotFound("order"))?;
        order.payment_intent_id = Some(intent_id.to_string());
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, CommerceError> {
        Ok(self.tables.lock().await.orders.get(&id).cloned())
    }

    async fn find_order_by_intent(&self, intent_id: &str) -> Result<Option<Order>, CommerceError> {
        Ok(self
            .tables
            .lock()
            .await
            .orders
            .values()
            .find(|o| o.payment_intent_id.as_deref() == Some(intent_id))
            .cloned())
    }

    async fn tickets_for_order(&self, id: OrderId) -> Result<Vec<IssuedTicket>, CommerceError> {
        Ok(self
            .tables
            .lock()
            .await
            .tickets
            .iter()
            .filter(|t| t.order_id == id)
            .cloned()
            .collect())
    }

    async fn release_order(
        &self,
        id: OrderId,
        reason: CancelReason,
    ) -> Result<Option<Order>, CommerceError> {
        Ok(self.tables.lock().await.release(id, reason))
    }

    async fn expired_reservations(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, CommerceError> {
        let t = self.tables.lock().await;
        let mut expired: Vec<Order> = t
            .orders
            .values()
            .filter(|o| releasable(o) && o.created_at < cutoff)
            .cloned()
            .collect();
        expired.sort_by_key(|o| o.created_at);
        Ok(expired)
    }

    async fn confirm_payment(
        &self,
        confirmation: PaymentConfirmation,
    ) -> Result<ConfirmationOutcome, CommerceError> {
        let mut t = self.tables.lock().await;
        let Some(mut order) = t.orders.get(&confirmation.order_id).cloned() else {
            return Ok(ConfirmationOutcome::UnknownOrder);
        };
        if t.confirmations.contains(&confirmation.processor_reference) {
            return Ok(ConfirmationOutcome::Duplicate);
        }
        let now = Utc::now();

        match (order.status, order.payment_method) {
            (OrderStatus::Pending, PaymentMethod::Online) => {}
            (OrderStatus::Canceled, _) => {
                order.processor_reference = Some(confirmation.processor_reference.clone());
                order.updated_at = now;
                t.confirmations.insert(confirmation.processor_reference);
                t.orders.insert(order.id, order.clone());
                return Ok(ConfirmationOutcome::LateForReleasedOrder(order));
            }
            (status, _) => return Ok(ConfirmationOutcome::NotPending(status)),
        }

        if let Some(received) = confirmation.amount
            && received != order.total
        {
            return Ok(ConfirmationOutcome::AmountMismatch {
                expected: order.total,
                received,
            });
        }

        let tickets = if order.kind == OrderKind::Ticket {
            let tt_id = order
                .line_items
                .first()
                .and_then(|li| li.ticket_type_id)
                .ok_or_else(|| CommerceError::Internal("ticket order without ticket type".into()))?;
            let tt = t
                .ticket_types
                .get_mut(&tt_id)
                .ok_or_else(|| CommerceError::Internal(format!("ticket type {tt_id} missing")))?;
            ticket::mint(
                tt,
                order.id,
                order.buyer_id,
                order.quantity(),
                Some(&confirmation.processor_reference),
                now,
            )
        } else {
            Vec::new()
        };

        order.status = OrderStatus::Paid;
        order.processor_reference = Some(confirmation.processor_reference.clone());
        order.updated_at = now;

        t.confirmations.insert(confirmation.processor_reference);
        t.orders.insert(order.id, order.clone());
        t.insert_tickets(&tickets);
        Ok(ConfirmationOutcome::Confirmed { order, tickets })
    }

    async fn resolve_token(
        &self,
        token: &RedemptionToken,
    ) -> Result<Option<TokenTarget>, CommerceError> {
        let t = self.tables.lock().await;
        let Some(owner) = t.tokens.get(token).copied() else {
            return Ok(None);
        };
        Ok(match owner {
            TokenOwner::Order(id) => t.orders.get(&id).cloned().map(TokenTarget::Order),
            TokenOwner::Ticket(id) => t.tickets.iter().find(|tk| tk.id == id).and_then(|tk| {
                t.orders.get(&tk.order_id).map(|o| TokenTarget::Ticket {
                    ticket: tk.clone(),
                    seller_id: o.seller_id,
                    order_status: o.status,
                })
            }),
        })
    }

    async fn redeem_order(
        &self,
        id: OrderId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>, CommerceError> {
        let mut t = self.tables.lock().await;
        let Some(order) = t.orders.get_mut(&id).filter(|o| redeemable(o)) else {
            return Ok(None);
        };
        order.status = OrderStatus::Redeemed;
        order.redeemed_at = Some(at);
        order.redeemed_by = Some(actor);
        order.updated_at = at;
        Ok(Some(order.clone()))
    }

    async fn redeem_ticket(
        &self,
        id: TicketId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<TicketRedemption>, CommerceError> {
        let mut t = self.tables.lock().await;
        let Some(order_id) = t.tickets.iter().find(|tk| tk.id == id).map(|tk| tk.order_id) else {
            return Ok(None);
        };
        if !t.orders.get(&order_id).is_some_and(|o| admits_entry(o.status)) {
            return Ok(None);
        }
        let Some(ticket) = t.tickets.iter_mut().find(|tk| tk.id == id && !tk.used) else {
            return Ok(None);
        };
        ticket.used = true;
        ticket.used_at = Some(at);
        ticket.used_by = Some(actor);
        let ticket = ticket.clone();

        let all_used = t.tickets.iter().all(|tk| tk.order_id != order_id || tk.used);
        let completed_order = if all_used {
            t.orders.get_mut(&order_id).map(|order| {
                order.status = OrderStatus::Redeemed;
                order.redeemed_at = Some(at);
                order.redeemed_by = Some(actor);
                order.updated_at = at;
                order.clone()
            })
        } else {
            None
        };
        Ok(Some(TicketRedemption {
            ticket,
            completed_order,
        }))
    }

    async fn mark_shipped(
        &self,
        id: OrderId,
        tracking: Tracking,
    ) -> Result<Option<Order>, CommerceError> {
        let mut t = self.tables.lock().await;
        let Some(order) = t.orders.get_mut(&id).filter(|o| {
            o.status == OrderStatus::Paid && o.fulfillment_method == FulfillmentMethod::Mail
        }) else {
            return Ok(None);
        };
        order.status = OrderStatus::Shipped;
        order.updated_at = tracking.shipped_at;
        order.tracking = Some(tracking);
        Ok(Some(order.clone()))
    }

    async fn cancel_order(&self, id: OrderId) -> Result<Option<Order>, CommerceError> {
        let mut t = self.tables.lock().await;
        if t.has_used_tickets(id) {
            return Ok(None);
        }
        let Some(order) = t
            .orders
            .get_mut(&id)
            .filter(|o| matches!(o.status, OrderStatus::Pending | OrderStatus::Paid))
        else {
            return Ok(None);
        };
        order.status = OrderStatus::Canceled;
        order.cancel_reason = Some(CancelReason::Administrative);
        order.updated_at = Utc::now();
        let canceled = order.clone();
        t.restock(&canceled);
        Ok(Some(canceled))
    }

    async fn refund_order(&self, id: OrderId) -> Result<Option<Order>, CommerceError> {
        let mut t = self.tables.lock().await;
        let Some(order) = t
            .orders
            .get_mut(&id)
            .filter(|o| o.status.can_transition_to(OrderStatus::Refunded))
        else {
            return Ok(None);
        };
        order.status = OrderStatus::Refunded;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }
}
