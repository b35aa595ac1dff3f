//! Storage layer: the inventory ledger and the order/ticket store.
//!
//! [`CommerceStore`] is the seam between services and storage. Every
//! method is one atomic unit: either all of its writes land or none do.
//! Check-then-set operations are conditional writes that return `None`
//! (or a non-confirming outcome) when the precondition no longer holds, so
//! concurrent callers never both succeed.
//!
//! Two backends implement it:
//! - [`postgres::PostgresStore`] for production, relying on row-level
//!   locks and unique constraints, safe across service instances.
//! - [`memory::MemoryStore`] for tests and single-instance development,
//!   serializing every operation behind one lock.

pub mod memory;
pub mod postgres;
pub mod rows;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    CancelReason, FeeSplit, FulfillmentMethod, IssuedTicket, LineItem, Order, OrderId, OrderKind,
    OrderStatus, PaymentMethod, Product, ProductId, PurchaseItem, RedemptionToken,
    ShippingAddress, ShippingSnapshot, TicketId, TicketType, TicketTypeId, Tracking, UserId, Yen,
};
use crate::error::CommerceError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// A validated purchase ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    /// Buyer placing the order.
    pub buyer_id: UserId,
    /// Catalog unit being bought.
    pub item: PurchaseItem,
    /// Units requested. Always at least one.
    pub quantity: u32,
    /// How the buyer pays.
    pub payment_method: PaymentMethod,
    /// How the purchase is delivered.
    pub fulfillment_method: FulfillmentMethod,
    /// Platform fee rate in basis points.
    pub fee_bps: u32,
}

/// Result of a committed checkout transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    /// The new order with its line items.
    pub order: Order,
    /// Tickets minted in the same transaction (cash ticket purchases only).
    pub tickets: Vec<IssuedTicket>,
}

/// A payment success reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    /// Order the payment is for.
    pub order_id: OrderId,
    /// Processor reference; at most one confirmation per reference.
    pub processor_reference: String,
    /// Amount the processor captured, when reported.
    pub amount: Option<Yen>,
}

/// What a payment confirmation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// The order moved `pending → paid`; tickets were minted for ticket orders.
    Confirmed {
        /// Order after the transition.
        order: Order,
        /// Tickets minted by this confirmation.
        tickets: Vec<IssuedTicket>,
    },
    /// The processor reference was already applied.
    Duplicate,
    /// No order matches the correlation metadata.
    UnknownOrder,
    /// The order is no longer awaiting payment.
    NotPending(OrderStatus),
    /// The reported amount differs from the order total.
    AmountMismatch {
        /// Order total.
        expected: Yen,
        /// Amount reported by the processor.
        received: Yen,
    },
    /// Payment arrived after the reservation was released; a refund is due.
    LateForReleasedOrder(Order),
}

/// A successful ticket scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRedemption {
    /// The ticket, now used.
    pub ticket: IssuedTicket,
    /// The order, when this scan used its last ticket and moved it to
    /// `redeemed`.
    pub completed_order: Option<Order>,
}

/// What a redemption token resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenTarget {
    /// A merchandise order.
    Order(Order),
    /// An issued ticket plus the context needed to authorize redemption.
    Ticket {
        /// The ticket.
        ticket: IssuedTicket,
        /// Artist owning the ticket type.
        seller_id: UserId,
        /// Status of the order the ticket was bought in.
        order_status: OrderStatus,
    },
}

/// Transactional storage for catalog units, orders, and tickets.
///
/// # Errors
///
/// Every method returns [`CommerceError::Persistence`] when the backend
/// fails; checkout additionally reports the business rejections listed on
/// [`CommerceStore::place_order`].
#[allow(clippy::missing_errors_doc)]
#[async_trait]
pub trait CommerceStore: Send + Sync + std::fmt::Debug {
    /// Inserts or replaces a product.
    async fn put_product(&self, product: Product) -> Result<(), CommerceError>;

    /// Inserts or replaces a ticket type.
    async fn put_ticket_type(&self, ticket_type: TicketType) -> Result<(), CommerceError>;

    /// Changes a product's catalog price. Existing line items keep theirs.
    async fn set_product_price(&self, id: ProductId, price: Yen) -> Result<(), CommerceError>;

    /// Loads a product.
    async fn product(&self, id: ProductId) -> Result<Option<Product>, CommerceError>;

    /// Loads a ticket type.
    async fn ticket_type(&self, id: TicketTypeId) -> Result<Option<TicketType>, CommerceError>;

    /// Stores a buyer's shipping address.
    async fn put_shipping_address(
        &self,
        user_id: UserId,
        address: ShippingAddress,
    ) -> Result<(), CommerceError>;

    /// Loads a buyer's shipping address.
    async fn shipping_address(
        &self,
        user_id: UserId,
    ) -> Result<Option<ShippingAddress>, CommerceError>;

    /// Checkout transaction: verifies and decrements the unit's remaining
    /// quantity and creates the order with price snapshots, all at once.
    ///
    /// Cash ticket purchases also mint their tickets in the same transaction.
    /// Fails with [`CommerceError::MissingShippingAddress`],
    /// [`CommerceError::NotFound`], or [`CommerceError::InsufficientStock`]
    /// without side effects.
    async fn place_order(&self, draft: OrderDraft) -> Result<PlacedOrder, CommerceError>;

    /// Records the payment intent opened for an order.
    async fn attach_payment_intent(
        &self,
        order_id: OrderId,
        intent_id: &str,
    ) -> Result<(), CommerceError>;

    /// Loads an order with its line items.
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, CommerceError>;

    /// Loads the order a payment intent was opened for.
    async fn find_order_by_intent(&self, intent_id: &str) -> Result<Option<Order>, CommerceError>;

    /// Lists the tickets issued for an order.
    async fn tickets_for_order(&self, id: OrderId) -> Result<Vec<IssuedTicket>, CommerceError>;

    /// Releases a pending online order: `pending → canceled` and its stock is
    /// restored. Returns `None` if the order is not a pending online order.
    async fn release_order(
        &self,
        id: OrderId,
        reason: CancelReason,
    ) -> Result<Option<Order>, CommerceError>;

    /// Lists pending online orders created before `cutoff`, oldest first.
    async fn expired_reservations(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, CommerceError>;

    /// Applies a payment confirmation idempotently.
    async fn confirm_payment(
        &self,
        confirmation: PaymentConfirmation,
    ) -> Result<ConfirmationOutcome, CommerceError>;

    /// Resolves a redemption token to its order or ticket.
    async fn resolve_token(
        &self,
        token: &RedemptionToken,
    ) -> Result<Option<TokenTarget>, CommerceError>;

    /// Conditionally marks a merchandise order redeemed. Returns `None` if
    /// the order is not (or no longer) redeemable.
    async fn redeem_order(
        &self,
        id: OrderId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>, CommerceError>;

    /// Conditionally flips a ticket's `used` flag. Returns `None` if it was
    /// already used or its order was canceled or refunded meanwhile. When
    /// the scan uses the order's last ticket, the order moves to `redeemed`
    /// in the same transaction.
    async fn redeem_ticket(
        &self,
        id: TicketId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<TicketRedemption>, CommerceError>;

    /// Conditionally moves a paid mail order to `shipped`.
    async fn mark_shipped(
        &self,
        id: OrderId,
        tracking: Tracking,
    ) -> Result<Option<Order>, CommerceError>;

    /// Conditionally cancels a pending or paid order with no used tickets,
    /// restoring its stock.
    async fn cancel_order(&self, id: OrderId) -> Result<Option<Order>, CommerceError>;

    /// Conditionally marks an order refunded.
    async fn refund_order(&self, id: OrderId) -> Result<Option<Order>, CommerceError>;
}

/// Catalog facts read under the unit's row lock.
#[derive(Debug, Clone)]
pub(crate) struct UnitSnapshot {
    pub seller_id: UserId,
    pub name: String,
    pub price: Yen,
}

/// Builds the order row for a draft from the locked unit's current price.
///
/// The total is always computed here, server-side, from the catalog price.
pub(crate) fn build_order(
    draft: &OrderDraft,
    unit: &UnitSnapshot,
    shipping: Option<ShippingSnapshot>,
    now: DateTime<Utc>,
) -> Result<Order, CommerceError> {
    let total = unit.price.times(draft.quantity)?;
    let split = FeeSplit::compute(total, draft.fee_bps);
    let (kind, product_id, ticket_type_id) = match draft.item {
        PurchaseItem::Product { product_id } => (OrderKind::Merchandise, Some(product_id), None),
        PurchaseItem::Ticket { ticket_type_id } => (OrderKind::Ticket, None, Some(ticket_type_id)),
    };
    Ok(Order {
        id: OrderId::new(),
        buyer_id: draft.buyer_id,
        seller_id: unit.seller_id,
        kind,
        total: split.total,
        platform_fee: split.platform_fee,
        payout: split.payout,
        status: OrderStatus::Pending,
        payment_method: draft.payment_method,
        fulfillment_method: draft.fulfillment_method,
        shipping,
        payment_intent_id: None,
        processor_reference: None,
        redemption_token: (kind == OrderKind::Merchandise).then(RedemptionToken::generate),
        tracking: None,
        redeemed_at: None,
        redeemed_by: None,
        cancel_reason: None,
        created_at: now,
        updated_at: now,
        line_items: vec![LineItem {
            product_id,
            ticket_type_id,
            quantity: draft.quantity,
            unit_price: unit.price,
            name: unit.name.clone(),
        }],
    })
}

/// Whether checkout mints tickets immediately instead of on confirmation.
pub(crate) fn issues_at_checkout(order: &Order) -> bool {
    order.kind == OrderKind::Ticket && order.payment_method == PaymentMethod::Cash
}

/// Whether an order's stored state satisfies the redemption precondition.
pub(crate) fn redeemable(order: &Order) -> bool {
    order.ensure_redeemable().is_ok()
}

/// Whether tickets bought in an order with this status may still be used.
pub(crate) fn admits_entry(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Pending | OrderStatus::Paid)
}

/// Whether an order may be released back to stock by the reservation logic.
pub(crate) fn releasable(order: &Order) -> bool {
    order.status == OrderStatus::Pending && order.payment_method == PaymentMethod::Online
}
