//! Order reads and out-of-band transitions: ship, cancel, refund.

use chrono::Utc;
use tracing::info;

use super::CommerceService;
use crate::auth::Actor;
use crate::domain::{IssuedTicket, Order, OrderId, OrderStatus, Tracking};
use crate::error::CommerceError;

/// An order with the tickets issued for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderView {
    /// The order.
    pub order: Order,
    /// Tickets issued for it; empty for merchandise.
    pub tickets: Vec<IssuedTicket>,
}

impl CommerceService {
    async fn load(&self, id: OrderId) -> Result<Order, CommerceError> {
        self.store
            .find_order(id)
            .await?
            .ok_or(CommerceError::NotFound("order"))
    }

    /// Reads an order. Visible to its buyer, its seller, and admins.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::NotFound`] or [`CommerceError::Forbidden`].
    pub async fn get_order(&self, actor: &Actor, id: OrderId) -> Result<OrderView, CommerceError> {
        let order = self.load(id).await?;
        if actor.user_id != order.buyer_id && !actor.acts_for(order.seller_id) {
            return Err(CommerceError::Forbidden("not a party to this order".into()));
        }
        let tickets = self.store.tickets_for_order(id).await?;
        Ok(OrderView { order, tickets })
    }

    /// Marks a paid mail order as shipped. Seller or admin only.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::InvalidRequest`] for blank tracking fields,
    /// [`CommerceError::NotFound`], [`CommerceError::Forbidden`], or
    /// [`CommerceError::InvalidTransition`] unless the order is a paid mail order.
    pub async fn ship_order(
        &self,
        actor: &Actor,
        id: OrderId,
        carrier: &str,
        tracking_number: &str,
    ) -> Result<Order, CommerceError> {
        let (carrier, tracking_number) = (carrier.trim(), tracking_number.trim());
        if carrier.is_empty() || tracking_number.is_empty() {
            return Err(CommerceError::InvalidRequest(
                "carrier and tracking_number are required".into(),
            ));
        }
        let order = self.load(id).await?;
        if !actor.acts_for(order.seller_id) {
            return Err(CommerceError::Forbidden("not the seller of this order".into()));
        }
        let tracking = Tracking {
            carrier: carrier.to_string(),
            tracking_number: tracking_number.to_string(),
            shipped_at: Utc::now(),
        };
        let shipped = self
            .store
            .mark_shipped(id, tracking)
            .await?
            .ok_or(CommerceError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Shipped,
            })?;
        info!(order_id = %id, carrier, "order shipped");
        self.mirror(&shipped, &[]);
        Ok(shipped)
    }

    /// Cancels a pending or paid order with no used tickets and restores its
    /// stock. Admin only.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Forbidden`], [`CommerceError::NotFound`], or
    /// [`CommerceError::InvalidTransition`].
    pub async fn cancel_order(&self, actor: &Actor, id: OrderId) -> Result<Order, CommerceError> {
        actor.require_admin()?;
        let order = self.load(id).await?;
        let canceled = self
            .store
            .cancel_order(id)
            .await?
            .ok_or(CommerceError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Canceled,
            })?;
        info!(order_id = %id, actor = %actor.user_id, "order canceled");
        let tickets = self.store.tickets_for_order(id).await?;
        self.mirror(&canceled, &tickets);
        Ok(canceled)
    }

    /// Marks an order refunded. Status only; the money movement happens at
    /// the processor. Admin only.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Forbidden`], [`CommerceError::NotFound`], or
    /// [`CommerceError::InvalidTransition`].
    pub async fn refund_order(&self, actor: &Actor, id: OrderId) -> Result<Order, CommerceError> {
        actor.require_admin()?;
        let order = self.load(id).await?;
        let refunded = self
            .store
            .refund_order(id)
            .await?
            .ok_or(CommerceError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Refunded,
            })?;
        info!(order_id = %id, actor = %actor.user_id, total = %refunded.total, "order refunded");
        let tickets = self.store.tickets_for_order(id).await?;
        self.mirror(&refunded, &tickets);
        Ok(refunded)
    }
}
