//! Redemption State Machine: one-time use of redemption tokens.
//!
//! Checks run in a fixed order: resolve the token, match the scanning
//! mode, authorize the actor, reject repeats, then apply the transition as
//! a single conditional write. Two concurrent scans of one token both pass
//! the early checks at most; only one conditional write matches.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::CommerceService;
use crate::auth::Actor;
use crate::domain::{
    IssuedTicket, Order, OrderId, OrderStatus, RedemptionMode, RedemptionToken, StatusDocument,
    TicketId, UserId,
};
use crate::error::CommerceError;
use crate::store::{TokenTarget, admits_entry};

/// Summary of a redeemed order or ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionReceipt {
    /// Which kind of entity was redeemed.
    pub mode: RedemptionMode,
    /// Order the entity belongs to.
    pub order_id: OrderId,
    /// Ticket redeemed, for ticket mode.
    pub ticket_id: Option<TicketId>,
    /// Seat label, for ticket mode.
    pub seat_label: Option<String>,
    /// Status after redemption.
    pub status: OrderStatus,
    /// When it was redeemed.
    pub redeemed_at: DateTime<Utc>,
    /// Who redeemed it.
    pub redeemed_by: UserId,
}

impl CommerceService {
    /// Redeems `raw_token` in `mode` on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// - [`CommerceError::NotFound`] for unknown or malformed tokens.
    /// - [`CommerceError::WrongRedemptionMode`] when the token belongs to the
    ///   other mode; the caller should switch modes and rescan.
    /// - [`CommerceError::Forbidden`] unless the actor is the seller or an admin.
    /// - [`CommerceError::AlreadyRedeemed`] for a repeat scan.
    /// - [`CommerceError::InvalidTransition`] when the order is not in a
    ///   redeemable state (unpaid, not yet shipped, canceled, refunded).
    pub async fn redeem(
        &self,
        actor: &Actor,
        raw_token: &str,
        mode: RedemptionMode,
    ) -> Result<RedemptionReceipt, CommerceError> {
        let token = RedemptionToken::parse(raw_token)
            .ok_or(CommerceError::NotFound("redemption token"))?;
        let target = self
            .store
            .resolve_token(&token)
            .await?
            .ok_or(CommerceError::NotFound("redemption token"))?;

        match (target, mode) {
            (TokenTarget::Order(order), RedemptionMode::Merchandise) => {
                self.redeem_order(actor, order).await
            }
            (
                TokenTarget::Ticket {
                    ticket,
                    seller_id,
                    order_status,
                },
                RedemptionMode::Ticket,
            ) => {
                self.redeem_ticket(actor, ticket, seller_id, order_status)
                    .await
            }
            (TokenTarget::Order(_), RedemptionMode::Ticket) => {
                warn!(actor = %actor.user_id, "merchandise token scanned in ticket mode");
                Err(CommerceError::WrongRedemptionMode {
                    actual: RedemptionMode::Merchandise,
                })
            }
            (TokenTarget::Ticket { .. }, RedemptionMode::Merchandise) => {
                warn!(actor = %actor.user_id, "ticket token scanned in merchandise mode");
                Err(CommerceError::WrongRedemptionMode {
                    actual: RedemptionMode::Ticket,
                })
            }
        }
    }

    async fn redeem_order(
        &self,
        actor: &Actor,
        order: Order,
    ) -> Result<RedemptionReceipt, CommerceError> {
        if !actor.acts_for(order.seller_id) {
            return Err(CommerceError::Forbidden("not the seller of this order".into()));
        }
        order.ensure_redeemable()?;

        let now = Utc::now();
        let Some(redeemed) = self.store.redeem_order(order.id, actor.user_id, now).await? else {
            // Lost a race with another scan or an administrative transition.
            let current = self
                .store
                .find_order(order.id)
                .await?
                .ok_or(CommerceError::NotFound("order"))?;
            current.ensure_redeemable()?;
            return Err(CommerceError::AlreadyRedeemed);
        };

        info!(order_id = %redeemed.id, actor = %actor.user_id, "order redeemed");
        self.mirror(&redeemed, &[]);
        Ok(RedemptionReceipt {
            mode: RedemptionMode::Merchandise,
            order_id: redeemed.id,
            ticket_id: None,
            seat_label: None,
            status: redeemed.status,
            redeemed_at: now,
            redeemed_by: actor.user_id,
        })
    }

    async fn redeem_ticket(
        &self,
        actor: &Actor,
        ticket: IssuedTicket,
        seller_id: UserId,
        order_status: OrderStatus,
    ) -> Result<RedemptionReceipt, CommerceError> {
        if !actor.acts_for(seller_id) {
            return Err(CommerceError::Forbidden("not the organizer of this event".into()));
        }
        if ticket.used {
            return Err(CommerceError::AlreadyRedeemed);
        }
        let not_admitted = || CommerceError::InvalidTransition {
            from: order_status,
            to: OrderStatus::Redeemed,
        };
        if !admits_entry(order_status) {
            return Err(not_admitted());
        }

        let now = Utc::now();
        let Some(scan) = self.store.redeem_ticket(ticket.id, actor.user_id, now).await? else {
            return match self.store.resolve_token(&ticket.redemption_token).await? {
                Some(TokenTarget::Ticket { ticket, .. }) if ticket.used => {
                    Err(CommerceError::AlreadyRedeemed)
                }
                _ => Err(not_admitted()),
            };
        };

        let used = scan.ticket;
        info!(
            ticket_id = %used.id,
            seat = %used.seat_label,
            actor = %actor.user_id,
            "ticket redeemed"
        );
        drop(self.publisher.publish(vec![StatusDocument::for_ticket(&used)]));
        if let Some(order) = scan.completed_order {
            info!(order_id = %order.id, "every ticket used; order redeemed");
        }
        Ok(RedemptionReceipt {
            mode: RedemptionMode::Ticket,
            order_id: used.order_id,
            ticket_id: Some(used.id),
            seat_label: Some(used.seat_label),
            status: OrderStatus::Redeemed,
            redeemed_at: now,
            redeemed_by: actor.user_id,
        })
    }
}
