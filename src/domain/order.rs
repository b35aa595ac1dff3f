//! Orders, line items, and the order status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::catalog::ShippingSnapshot;
use super::ids::{OrderId, ProductId, TicketTypeId, UserId};
use super::money::Yen;
use super::token::RedemptionToken;
use crate::error::CommerceError;

/// Order lifecycle status.
///
/// ```text
/// pending ──► paid ──► shipped ──► redeemed ──► refunded
///    │          │                     ▲
///    │          └─────────────────────┤ (venue pickup)
///    └── (cash, payable on redemption)┘
/// pending | paid ──► canceled ──► refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Stock reserved; awaiting online payment, or payable on redemption for cash.
    Pending,
    /// Payment confirmed; awaiting fulfillment.
    Paid,
    /// Mailed to the buyer.
    Shipped,
    /// Handed over at pickup or delivery confirmed. Terminal for fulfillment.
    Redeemed,
    /// Canceled before fulfillment; stock was restored.
    Canceled,
    /// Money returned to the buyer.
    Refunded,
}

impl OrderStatus {
    /// Returns `true` if moving from `self` to `next` follows the status machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid | Self::Redeemed | Self::Canceled)
                | (
                    Self::Paid,
                    Self::Shipped | Self::Redeemed | Self::Canceled | Self::Refunded
                )
                | (Self::Shipped, Self::Redeemed | Self::Refunded)
                | (Self::Redeemed | Self::Canceled, Self::Refunded)
        )
    }

    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Redeemed => "redeemed",
            Self::Canceled => "canceled",
            Self::Refunded => "refunded",
        }
    }

    /// Parses the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "shipped" => Some(Self::Shipped),
            "redeemed" => Some(Self::Redeemed),
            "canceled" => Some(Self::Canceled),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

/// How the buyer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card payment through the external processor.
    Online,
    /// Cash at the venue, collected on redemption.
    Cash,
}

impl PaymentMethod {
    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Cash => "cash",
        }
    }

    /// Parses the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "cash" => Some(Self::Cash),
            _ => None,
        }
    }
}

/// How the purchase reaches the buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentMethod {
    /// Shipped to the buyer's address.
    Mail,
    /// Collected in person at the venue.
    Venue,
}

impl FulfillmentMethod {
    /// Whether a shipping address must be on file at checkout.
    #[must_use]
    pub const fn requires_shipping(self) -> bool {
        matches!(self, Self::Mail)
    }

    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mail => "mail",
            Self::Venue => "venue",
        }
    }

    /// Parses the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mail" => Some(Self::Mail),
            "venue" => Some(Self::Venue),
            _ => None,
        }
    }
}

/// Whether an order bought merchandise or tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Merchandise; the order itself carries the redemption token.
    Merchandise,
    /// Tickets; each issued ticket carries its own token.
    Ticket,
}

impl OrderKind {
    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Merchandise => "merchandise",
            Self::Ticket => "ticket",
        }
    }

    /// Parses the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "merchandise" => Some(Self::Merchandise),
            "ticket" => Some(Self::Ticket),
            _ => None,
        }
    }
}

/// Why an order was canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The processor reported a failed payment.
    PaymentFailed,
    /// The payment intent could not be opened.
    PaymentNotStarted,
    /// The order stayed unpaid past the reservation window.
    ReservationExpired,
    /// Canceled by an administrator.
    Administrative,
}

impl CancelReason {
    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaymentFailed => "payment_failed",
            Self::PaymentNotStarted => "payment_not_started",
            Self::ReservationExpired => "reservation_expired",
            Self::Administrative => "administrative",
        }
    }

    /// Parses the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "payment_failed" => Some(Self::PaymentFailed),
            "payment_not_started" => Some(Self::PaymentNotStarted),
            "reservation_expired" => Some(Self::ReservationExpired),
            "administrative" => Some(Self::Administrative),
            _ => None,
        }
    }
}

/// Carrier tracking recorded when a mail order ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Tracking {
    /// Shipping carrier name.
    pub carrier: String,
    /// Carrier tracking number.
    pub tracking_number: String,
    /// When the parcel was handed to the carrier.
    pub shipped_at: DateTime<Utc>,
}

/// One purchased line of an order, frozen at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product bought; `None` for tickets or once the product is deleted.
    pub product_id: Option<ProductId>,
    /// Ticket type bought; `None` for merchandise or once deleted.
    pub ticket_type_id: Option<TicketTypeId>,
    /// Units bought.
    pub quantity: u32,
    /// Unit price at purchase time, independent of later catalog edits.
    pub unit_price: Yen,
    /// Catalog name at purchase time.
    pub name: String,
}

/// The relational record of a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier.
    pub id: OrderId,
    /// Buyer.
    pub buyer_id: UserId,
    /// Artist owning the purchased catalog entity.
    pub seller_id: UserId,
    /// Merchandise or tickets.
    pub kind: OrderKind,
    /// Amount charged, computed server-side.
    pub total: Yen,
    /// Platform commission.
    pub platform_fee: Yen,
    /// Amount owed to the artist.
    pub payout: Yen,
    /// Current status.
    pub status: OrderStatus,
    /// How the buyer pays.
    pub payment_method: PaymentMethod,
    /// How the purchase is delivered.
    pub fulfillment_method: FulfillmentMethod,
    /// Address captured at purchase time (mail orders only).
    pub shipping: Option<ShippingSnapshot>,
    /// Processor payment intent opened for this order.
    pub payment_intent_id: Option<String>,
    /// Processor reference recorded when payment was confirmed.
    pub processor_reference: Option<String>,
    /// Pickup/delivery credential (merchandise orders only).
    pub redemption_token: Option<RedemptionToken>,
    /// Shipping details once shipped.
    pub tracking: Option<Tracking>,
    /// When the order was redeemed.
    pub redeemed_at: Option<DateTime<Utc>>,
    /// Artist or administrator who redeemed it.
    pub redeemed_by: Option<UserId>,
    /// Why the order was canceled, if it was.
    pub cancel_reason: Option<CancelReason>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
    /// Purchased lines.
    pub line_items: Vec<LineItem>,
}

impl Order {
    /// Checks whether a merchandise order can be redeemed right now.
    ///
    /// Venue orders are redeemable once paid, or while pending when paid in
    /// cash at the counter. Mail orders are redeemable once shipped.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::AlreadyRedeemed`] for redeemed orders and
    /// [`CommerceError::InvalidTransition`] for any other non-redeemable state.
    pub fn ensure_redeemable(&self) -> Result<(), CommerceError> {
        let ok = match (self.status, self.fulfillment_method) {
            (OrderStatus::Redeemed, _) => return Err(CommerceError::AlreadyRedeemed),
            (OrderStatus::Paid, FulfillmentMethod::Venue) | (OrderStatus::Shipped, _) => true,
            (OrderStatus::Pending, FulfillmentMethod::Venue) => {
                self.payment_method == PaymentMethod::Cash
            }
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(CommerceError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Redeemed,
            })
        }
    }

    /// Total units across all line items.
    #[must_use]
    pub fn quantity(&self) -> u32 {
        self.line_items.iter().map(|li| li.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus, payment: PaymentMethod, fulfillment: FulfillmentMethod) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            buyer_id: UserId::new(),
            seller_id: UserId::new(),
            kind: OrderKind::Merchandise,
            total: Yen::new(3_000),
            platform_fee: Yen::new(300),
            payout: Yen::new(2_700),
            status,
            payment_method: payment,
            fulfillment_method: fulfillment,
            shipping: None,
            payment_intent_id: None,
            processor_reference: None,
            redemption_token: Some(RedemptionToken::generate()),
            tracking: None,
            redeemed_at: None,
            redeemed_by: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            line_items: Vec::new(),
        }
    }

    #[test]
    fn forward_transitions_are_allowed() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Redeemed));
        assert!(Redeemed.can_transition_to(Refunded));
        assert!(Canceled.can_transition_to(Refunded));
    }

    #[test]
    fn backward_transitions_are_rejected() {
        use OrderStatus::*;
        assert!(!Paid.can_transition_to(Pending));
        assert!(!Redeemed.can_transition_to(Paid));
        assert!(!Redeemed.can_transition_to(Redeemed));
        assert!(!Canceled.can_transition_to(Paid));
        assert!(!Refunded.can_transition_to(Canceled));
        assert!(!Shipped.can_transition_to(Canceled));
    }

    #[test]
    fn storage_strings_round_trip() {
        use OrderStatus::*;
        for s in [Pending, Paid, Shipped, Redeemed, Canceled, Refunded] {
            assert_eq!(OrderStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(OrderStatus::parse("lost"), None);
    }

    #[test]
    fn paid_venue_order_is_redeemable() {
        let o = order(OrderStatus::Paid, PaymentMethod::Online, FulfillmentMethod::Venue);
        assert!(o.ensure_redeemable().is_ok());
    }

    #[test]
    fn pending_cash_venue_order_is_payable_on_redemption() {
        let o = order(OrderStatus::Pending, PaymentMethod::Cash, FulfillmentMethod::Venue);
        assert!(o.ensure_redeemable().is_ok());
    }

    #[test]
    fn pending_online_order_is_not_redeemable() {
        let o = order(OrderStatus::Pending, PaymentMethod::Online, FulfillmentMethod::Venue);
        assert!(matches!(
            o.ensure_redeemable(),
            Err(CommerceError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn unshipped_mail_order_is_not_redeemable() {
        let o = order(OrderStatus::Paid, PaymentMethod::Online, FulfillmentMethod::Mail);
        assert!(o.ensure_redeemable().is_err());
        let shipped = order(OrderStatus::Shipped, PaymentMethod::Online, FulfillmentMethod::Mail);
        assert!(shipped.ensure_redeemable().is_ok());
    }

    #[test]
    fn redeemed_order_reports_already_redeemed() {
        let o = order(OrderStatus::Redeemed, PaymentMethod::Online, FulfillmentMethod::Venue);
        assert!(matches!(
            o.ensure_redeemable(),
            Err(CommerceError::AlreadyRedeemed)
        ));
    }
}
