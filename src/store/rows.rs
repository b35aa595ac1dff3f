//! Database rows and their conversion into domain types.
//!
//! Counts are stored as `INTEGER` and money as `BIGINT`; enums are stored
//! as their `as_str` text. A row that fails to convert is reported as a
//! [`CommerceError::Persistence`] error rather than silently coerced.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

use crate::domain::{
    CancelReason, FulfillmentMethod, IssuedTicket, LineItem, Order, OrderKind, OrderStatus,
    PaymentMethod, Product, RedemptionToken, SeatingMode, ShippingSnapshot, TicketType, Tracking,
    Yen,
};
use crate::error::CommerceError;

/// Columns selected for [`OrderRow`].
pub(crate) const ORDER_COLUMNS: &str = "id, buyer_id, seller_id, kind, total, platform_fee, \
     payout, status, payment_method, fulfillment_method, shipping, payment_intent_id, \
     processor_reference, redemption_token, tracking, redeemed_at, redeemed_by, cancel_reason, \
     created_at, updated_at";

/// Columns selected for [`TicketRow`].
pub(crate) const TICKET_COLUMNS: &str = "id, order_id, owner_id, ticket_type_id, event_id, \
     seat_label, redemption_token, used, used_at, used_by, payment_correlation_id, issued_at";

fn corrupt(column: &str, value: impl std::fmt::Display) -> CommerceError {
    CommerceError::Persistence(format!("invalid {column} in storage: {value}"))
}

fn count(column: &str, value: i32) -> Result<u32, CommerceError> {
    u32::try_from(value).map_err(|_| corrupt(column, value))
}

/// Converts a count for binding into an `INTEGER` column.
pub(crate) fn db_count(value: u32) -> Result<i32, CommerceError> {
    i32::try_from(value)
        .map_err(|_| CommerceError::InvalidRequest(format!("count {value} out of range")))
}

/// `products` row.
#[derive(Debug, FromRow)]
pub(crate) struct ProductRow {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub price: i64,
    pub stock: i32,
}

impl TryFrom<ProductRow> for Product {
    type Error = CommerceError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            seller_id: row.seller_id.into(),
            name: row.name,
            price: Yen::new(row.price),
            stock: count("stock", row.stock)?,
        })
    }
}

/// `ticket_types` row.
#[derive(Debug, FromRow)]
pub(crate) struct TicketTypeRow {
    pub id: Uuid,
    pub event_id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub price: i64,
    pub capacity: i32,
    pub remaining: i32,
    pub seating: String,
    pub issued_count: i32,
}

impl TryFrom<TicketTypeRow> for TicketType {
    type Error = CommerceError;

    fn try_from(row: TicketTypeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            event_id: row.event_id.into(),
            seller_id: row.seller_id.into(),
            seating: SeatingMode::parse(&row.seating)
                .ok_or_else(|| corrupt("seating", &row.seating))?,
            name: row.name,
            price: Yen::new(row.price),
            capacity: count("capacity", row.capacity)?,
            remaining: count("remaining", row.remaining)?,
            issued_count: count("issued_count", row.issued_count)?,
        })
    }
}

/// `order_line_items` row.
#[derive(Debug, FromRow)]
pub(crate) struct LineItemRow {
    pub product_id: Option<Uuid>,
    pub ticket_type_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: i64,
    pub name: String,
}

impl TryFrom<LineItemRow> for LineItem {
    type Error = CommerceError;

    fn try_from(row: LineItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: row.product_id.map(Into::into),
            ticket_type_id: row.ticket_type_id.map(Into::into),
            quantity: count("quantity", row.quantity)?,
            unit_price: Yen::new(row.unit_price),
            name: row.name,
        })
    }
}

/// `orders` row, without its line items.
#[derive(Debug, FromRow)]
pub(crate) struct OrderRow {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub kind: String,
    pub total: i64,
    pub platform_fee: i64,
    pub payout: i64,
    pub status: String,
    pub payment_method: String,
    pub fulfillment_method: String,
    pub shipping: Option<Json<ShippingSnapshot>>,
    pub payment_intent_id: Option<String>,
    pub processor_reference: Option<String>,
    pub redemption_token: Option<String>,
    pub tracking: Option<Json<Tracking>>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redeemed_by: Option<Uuid>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    /// Assembles the domain order from this row and its line items.
    pub fn into_order(self, line_items: Vec<LineItemRow>) -> Result<Order, CommerceError> {
        let cancel_reason = match self.cancel_reason {
            Some(raw) => {
                Some(CancelReason::parse(&raw).ok_or_else(|| corrupt("cancel_reason", &raw))?)
            }
            None => None,
        };
        Ok(Order {
            id: self.id.into(),
            buyer_id: self.buyer_id.into(),
            seller_id: self.seller_id.into(),
            kind: OrderKind::parse(&self.kind).ok_or_else(|| corrupt("kind", &self.kind))?,
            total: Yen::new(self.total),
            platform_fee: Yen::new(self.platform_fee),
            payout: Yen::new(self.payout),
            status: OrderStatus::parse(&self.status)
                .ok_or_else(|| corrupt("status", &self.status))?,
            payment_method: PaymentMethod::parse(&self.payment_method)
                .ok_or_else(|| corrupt("payment_method", &self.payment_method))?,
            fulfillment_method: FulfillmentMethod::parse(&self.fulfillment_method)
                .ok_or_else(|| corrupt("fulfillment_method", &self.fulfillment_method))?,
            shipping: self.shipping.map(|Json(s)| s),
            payment_intent_id: self.payment_intent_id,
            processor_reference: self.processor_reference,
            redemption_token: self.redemption_token.map(RedemptionToken::from_stored),
            tracking: self.tracking.map(|Json(t)| t),
            redeemed_at: self.redeemed_at,
            redeemed_by: self.redeemed_by.map(Into::into),
            cancel_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
            line_items: line_items
                .into_iter()
                .map(LineItem::try_from)
                .collect::<Result<_, _>>()?,
        })
    }
}

/// `issued_tickets` row.
#[derive(Debug, FromRow)]
pub(crate) struct TicketRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub owner_id: Uuid,
    pub ticket_type_id: Uuid,
    pub event_id: Uuid,
    pub seat_label: String,
    pub redemption_token: String,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub used_by: Option<Uuid>,
    pub payment_correlation_id: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl From<TicketRow> for IssuedTicket {
    fn from(row: TicketRow) -> Self {
        Self {
            id: row.id.into(),
            order_id: row.order_id.into(),
            owner_id: row.owner_id.into(),
            ticket_type_id: row.ticket_type_id.into(),
            event_id: row.event_id.into(),
            seat_label: row.seat_label,
            redemption_token: RedemptionToken::from_stored(row.redemption_token),
            used: row.used,
            used_at: row.used_at,
            used_by: row.used_by.map(Into::into),
            payment_correlation_id: row.payment_correlation_id,
            issued_at: row.issued_at,
        }
    }
}
