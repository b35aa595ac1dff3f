//! Order, line item, and ticket DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    CancelReason, FulfillmentMethod, IssuedTicket, LineItem, Order, OrderKind, OrderStatus,
    PaymentMethod, ShippingSnapshot, Tracking, Yen,
};
use crate::service::OrderView;

/// A line item with its purchase-time price.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LineItemDto {
    /// Product bought, for merchandise.
    pub product_id: Option<uuid::Uuid>,
    /// Ticket type bought, for tickets.
    pub ticket_type_id: Option<uuid::Uuid>,
    /// Units bought.
    pub quantity: u32,
    /// Unit price at purchase time.
    #[schema(value_type = i64)]
    pub unit_price: Yen,
    /// Name at purchase time.
    pub name: String,
}

impl From<&LineItem> for LineItemDto {
    fn from(item: &LineItem) -> Self {
        Self {
            product_id: item.product_id.map(|id| *id.as_uuid()),
            ticket_type_id: item.ticket_type_id.map(|id| *id.as_uuid()),
            quantity: item.quantity,
            unit_price: item.unit_price,
            name: item.name.clone(),
        }
    }
}

/// An issued ticket as shown to its owner.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TicketDto {
    /// Ticket identifier.
    pub ticket_id: uuid::Uuid,
    /// Event the ticket admits to.
    pub event_id: uuid::Uuid,
    /// Seat or pooled assignment label.
    pub seat_label: String,
    /// Entry credential, rendered as a QR code by the client.
    pub redemption_token: String,
    /// Whether the ticket has been scanned at entry.
    pub used: bool,
    /// When it was scanned.
    pub used_at: Option<DateTime<Utc>>,
}

impl From<&IssuedTicket> for TicketDto {
    fn from(t: &IssuedTicket) -> Self {
        Self {
            ticket_id: *t.id.as_uuid(),
            event_id: *t.event_id.as_uuid(),
            seat_label: t.seat_label.clone(),
            redemption_token: t.redemption_token.to_string(),
            used: t.used,
            used_at: t.used_at,
        }
    }
}

/// Full order state, the client's poll fallback for the status channel.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderResponse {
    /// Order identifier.
    pub order_id: uuid::Uuid,
    /// Merchandise or ticket.
    pub kind: OrderKind,
    /// Current status.
    pub status: OrderStatus,
    /// How the buyer pays.
    pub payment_method: PaymentMethod,
    /// How the purchase is delivered.
    pub fulfillment_method: FulfillmentMethod,
    /// Server-computed total.
    #[schema(value_type = i64)]
    pub total: Yen,
    /// Platform commission.
    #[schema(value_type = i64)]
    pub platform_fee: Yen,
    /// Seller payout.
    #[schema(value_type = i64)]
    pub payout: Yen,
    /// Pickup or delivery credential, for merchandise.
    pub redemption_token: Option<String>,
    /// Address captured at purchase, for mail orders.
    pub shipping: Option<ShippingSnapshot>,
    /// Carrier details once shipped.
    pub tracking: Option<Tracking>,
    /// Why the order was canceled.
    pub cancel_reason: Option<CancelReason>,
    /// When the order was redeemed.
    pub redeemed_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
    /// Items bought.
    pub line_items: Vec<LineItemDto>,
    /// Tickets issued, for ticket orders.
    pub tickets: Vec<TicketDto>,
}

impl OrderResponse {
    /// Builds the response from an order and its tickets.
    #[must_use]
    pub fn new(order: &Order, tickets: &[IssuedTicket]) -> Self {
        Self {
            order_id: *order.id.as_uuid(),
            kind: order.kind,
            status: order.status,
            payment_method: order.payment_method,
            fulfillment_method: order.fulfillment_method,
            total: order.total,
            platform_fee: order.platform_fee,
            payout: order.payout,
            redemption_token: order.redemption_token.as_ref().map(ToString::to_string),
            shipping: order.shipping.clone(),
            tracking: order.tracking.clone(),
            cancel_reason: order.cancel_reason,
            redeemed_at: order.redeemed_at,
            created_at: order.created_at,
            updated_at: order.updated_at,
            line_items: order.line_items.iter().map(LineItemDto::from).collect(),
            tickets: tickets.iter().map(TicketDto::from).collect(),
        }
    }
}

impl From<OrderView> for OrderResponse {
    fn from(view: OrderView) -> Self {
        Self::new(&view.order, &view.tickets)
    }
}

/// Request body for `POST /orders/{id}/ship`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ShipRequest {
    /// Delivery company.
    pub carrier: String,
    /// Carrier tracking number.
    pub tracking_number: String,
}
