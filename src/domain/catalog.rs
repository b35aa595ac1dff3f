//! Sellable units: merchandise stock and ticket-type capacity.
//!
//! Catalog rows are owned by the (out of scope) admin screens. This engine
//! only reads prices and atomically decrements the remaining quantity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::{EventId, ProductId, TicketTypeId, UserId};
use super::money::Yen;

/// A merchandise product with a stock count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier.
    pub id: ProductId,
    /// Artist selling the product.
    pub seller_id: UserId,
    /// Display name, copied onto line items at purchase time.
    pub name: String,
    /// Current catalog price.
    pub price: Yen,
    /// Units left in stock. Never negative.
    pub stock: u32,
}

/// How seat labels are assigned for a ticket type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SeatingMode {
    /// Each ticket gets a numbered seat scoped to its ticket type.
    Assigned,
    /// Tickets share a general-admission pool.
    Open,
}

impl SeatingMode {
    /// Label prefix used for open seating.
    pub const OPEN_POOL_LABEL: &'static str = "GA";

    /// Returns the seat label for the `sequence`-th ticket (1-based) of a
    /// ticket type named `type_name`.
    #[must_use]
    pub fn label(self, type_name: &str, sequence: u32) -> String {
        match self {
            Self::Assigned => format!("{type_name}-{sequence}"),
            Self::Open => format!("{}-{sequence}", Self::OPEN_POOL_LABEL),
        }
    }

    /// Stable storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Open => "open",
        }
    }

    /// Parses the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "assigned" => Some(Self::Assigned),
            "open" => Some(Self::Open),
            _ => None,
        }
    }
}

/// A ticket type: priced admission to an event with finite capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketType {
    /// Ticket type identifier.
    pub id: TicketTypeId,
    /// Event the ticket type admits to.
    pub event_id: EventId,
    /// Artist running the event.
    pub seller_id: UserId,
    /// Display name (e.g. `"S席"`), also the seat label prefix.
    pub name: String,
    /// Current catalog price.
    pub price: Yen,
    /// Total capacity.
    pub capacity: u32,
    /// Capacity not yet reserved. Never negative, never above `capacity`.
    pub remaining: u32,
    /// Seat label policy.
    pub seating: SeatingMode,
    /// Tickets minted so far; drives the running seat count.
    pub issued_count: u32,
}

impl TicketType {
    /// Creates a ticket type with all capacity remaining and nothing issued.
    #[must_use]
    pub fn new(
        event_id: EventId,
        seller_id: UserId,
        name: impl Into<String>,
        price: Yen,
        capacity: u32,
        seating: SeatingMode,
    ) -> Self {
        Self {
            id: TicketTypeId::new(),
            event_id,
            seller_id,
            name: name.into(),
            price,
            capacity,
            remaining: capacity,
            seating,
            issued_count: 0,
        }
    }
}

/// What a checkout request is buying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PurchaseItem {
    /// Merchandise from stock.
    Product {
        /// Product being bought.
        #[schema(value_type = uuid::Uuid)]
        product_id: ProductId,
    },
    /// Admission from ticket-type capacity.
    Ticket {
        /// Ticket type being bought.
        #[schema(value_type = uuid::Uuid)]
        ticket_type_id: TicketTypeId,
    },
}

impl PurchaseItem {
    /// Returns the underlying catalog row identifier.
    #[must_use]
    pub fn unit_id(&self) -> uuid::Uuid {
        match self {
            Self::Product { product_id } => *product_id.as_uuid(),
            Self::Ticket { ticket_type_id } => *ticket_type_id.as_uuid(),
        }
    }
}

/// A buyer's shipping address on file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    /// Recipient name.
    pub recipient: String,
    /// Postal code.
    pub postal_code: String,
    /// Prefecture or region.
    pub region: String,
    /// City or ward.
    pub city: String,
    /// Street address line.
    pub line1: String,
    /// Building / room line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    /// Contact phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Shipping address frozen onto an order at purchase time.
///
/// Later edits to the buyer's address book do not affect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShippingSnapshot {
    /// Address as it was when the order was placed.
    pub address: ShippingAddress,
    /// When the snapshot was taken.
    pub captured_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigned_labels_use_type_name() {
        assert_eq!(SeatingMode::Assigned.label("S席", 12), "S席-12");
    }

    #[test]
    fn open_labels_use_pool_name() {
        assert_eq!(SeatingMode::Open.label("Standing", 3), "GA-3");
    }

    #[test]
    fn seating_mode_storage_round_trip() {
        for mode in [SeatingMode::Assigned, SeatingMode::Open] {
            assert_eq!(SeatingMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(SeatingMode::parse("balcony"), None);
    }

    #[test]
    fn purchase_item_uses_kind_tag() {
        let id = ProductId::new();
        let json = serde_json::json!({ "kind": "product", "product_id": id });
        let parsed: Result<PurchaseItem, _> = serde_json::from_value(json);
        assert_eq!(parsed.ok(), Some(PurchaseItem::Product { product_id: id }));
    }

    #[test]
    fn new_ticket_type_starts_full() {
        let tt = TicketType::new(
            EventId::new(),
            UserId::new(),
            "A席",
            Yen::new(5_000),
            100,
            SeatingMode::Assigned,
        );
        assert_eq!(tt.remaining, 100);
        assert_eq!(tt.issued_count, 0);
    }
}
