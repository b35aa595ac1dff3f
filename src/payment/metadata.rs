//! Correlation metadata attached to payment intents.
//!
//! Processors echo intent metadata back as a flat string map, so every
//! field is encoded as a string.

use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::{Order, OrderId, OrderKind, UserId};

const ORDER_ID: &str = "order_id";
const BUYER_ID: &str = "buyer_id";
const KIND: &str = "kind";
const ITEM_ID: &str = "item_id";
const QUANTITY: &str = "quantity";

/// Enough context to find the order a payment notification belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationMetadata {
    /// Order being paid.
    pub order_id: OrderId,
    /// Buyer paying.
    pub buyer_id: UserId,
    /// Merchandise or tickets.
    pub kind: OrderKind,
    /// Product or ticket type bought.
    pub item_id: Uuid,
    /// Units bought.
    pub quantity: u32,
}

impl CorrelationMetadata {
    /// Builds the metadata for an order. Returns `None` for an order with no
    /// line item.
    #[must_use]
    pub fn for_order(order: &Order) -> Option<Self> {
        let line = order.line_items.first()?;
        let item_id = match order.kind {
            OrderKind::Merchandise => line.product_id.map(Uuid::from),
            OrderKind::Ticket => line.ticket_type_id.map(Uuid::from),
        }?;
        Some(Self {
            order_id: order.id,
            buyer_id: order.buyer_id,
            kind: order.kind,
            item_id,
            quantity: order.quantity(),
        })
    }

    /// Encodes as the processor's string map.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (ORDER_ID.to_string(), self.order_id.to_string()),
            (BUYER_ID.to_string(), self.buyer_id.to_string()),
            (KIND.to_string(), self.kind.as_str().to_string()),
            (ITEM_ID.to_string(), self.item_id.to_string()),
            (QUANTITY.to_string(), self.quantity.to_string()),
        ])
    }

    /// Decodes a string map echoed back by the processor. Returns `None` if
    /// any field is missing or malformed.
    #[must_use]
    pub fn from_map(map: &HashMap<String, String>) -> Option<Self> {
        let uuid = |key: &str| map.get(key).and_then(|v| Uuid::parse_str(v).ok());
        Some(Self {
            order_id: uuid(ORDER_ID)?.into(),
            buyer_id: uuid(BUYER_ID)?.into(),
            kind: OrderKind::parse(map.get(KIND)?)?,
            item_id: uuid(ITEM_ID)?,
            quantity: map.get(QUANTITY)?.parse().ok()?,
        })
    }
}
