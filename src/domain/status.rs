//! Mirrored status documents pushed to real-time clients.
//!
//! A [`StatusDocument`] is a non-authoritative copy of an order's or
//! ticket's state, keyed by its redemption token. The relational store
//! remains the source of truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::UserId;
use super::order::{Order, OrderStatus};
use super::ticket::IssuedTicket;
use super::token::RedemptionToken;

/// Status mirror entry for one redemption token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusDocument {
    /// Redemption token the document is keyed by.
    #[schema(value_type = String)]
    pub token: RedemptionToken,
    /// Mirrored status. Tickets report `paid` once issued and `redeemed` once used.
    pub status: OrderStatus,
    /// When the mirrored transition committed.
    pub timestamp: DateTime<Utc>,
    /// Actor who redeemed the token, if any.
    #[schema(value_type = Option<uuid::Uuid>)]
    pub redeemed_by: Option<UserId>,
}

impl StatusDocument {
    /// Mirror of a merchandise order. `None` for orders without a token.
    #[must_use]
    pub fn for_order(order: &Order) -> Option<Self> {
        order.redemption_token.as_ref().map(|token| Self {
            token: token.clone(),
            status: order.status,
            timestamp: order.updated_at,
            redeemed_by: order.redeemed_by,
        })
    }

    /// Mirror of an issued ticket.
    #[must_use]
    pub fn for_ticket(ticket: &IssuedTicket) -> Self {
        let (status, timestamp) = match ticket.used_at {
            Some(at) if ticket.used => (OrderStatus::Redeemed, at),
            _ => (OrderStatus::Paid, ticket.issued_at),
        };
        Self {
            token: ticket.redemption_token.clone(),
            status,
            timestamp,
            redeemed_by: ticket.used_by,
        }
    }

    /// Replaces the mirrored status, as when a ticket's order is canceled
    /// or refunded after issuance.
    #[must_use]
    pub fn superseded(mut self, status: OrderStatus, at: DateTime<Utc>) -> Self {
        self.status = status;
        self.timestamp = at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventId, OrderId, TicketId, TicketTypeId};

    fn ticket() -> IssuedTicket {
        IssuedTicket {
            id: TicketId::new(),
            order_id: OrderId::new(),
            owner_id: UserId::new(),
            ticket_type_id: TicketTypeId::new(),
            event_id: EventId::new(),
            seat_label: "GA-1".into(),
            redemption_token: RedemptionToken::generate(),
            used: false,
            used_at: None,
            used_by: None,
            payment_correlation_id: Some("pi_1".into()),
            issued_at: Utc::now(),
        }
    }

    #[test]
    fn unused_ticket_mirrors_as_paid() {
        let t = ticket();
        let doc = StatusDocument::for_ticket(&t);
        assert_eq!(doc.status, OrderStatus::Paid);
        assert_eq!(doc.timestamp, t.issued_at);
        assert_eq!(doc.redeemed_by, None);
    }

    #[test]
    fn used_ticket_mirrors_redeemer() {
        let mut t = ticket();
        let staff = UserId::new();
        let at = Utc::now();
        t.used = true;
        t.used_at = Some(at);
        t.used_by = Some(staff);
        let doc = StatusDocument::for_ticket(&t);
        assert_eq!(doc.status, OrderStatus::Redeemed);
        assert_eq!(doc.timestamp, at);
        assert_eq!(doc.redeemed_by, Some(staff));
    }

    #[test]
    fn superseded_keeps_token() {
        let t = ticket();
        let at = Utc::now();
        let doc = StatusDocument::for_ticket(&t).superseded(OrderStatus::Refunded, at);
        assert_eq!(doc.token, t.redemption_token);
        assert_eq!(doc.status, OrderStatus::Refunded);
    }
}
