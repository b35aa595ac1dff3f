//! Domain layer: catalog units, orders, tickets, tokens, and status mirroring.
//!
//! Pure types and rules with no I/O. Storage backends and services build
//! on these types; every status change is validated against
//! [`OrderStatus::can_transition_to`].

pub mod catalog;
pub mod event_bus;
pub mod ids;
pub mod money;
pub mod order;
pub mod status;
pub mod ticket;
pub mod token;

pub use catalog::{
    Product, PurchaseItem, SeatingMode, ShippingAddress, ShippingSnapshot, TicketType,
};
pub use event_bus::EventBus;
pub use ids::{EventId, OrderId, ProductId, TicketId, TicketTypeId, UserId};
pub use money::{FeeSplit, Yen};
pub use order::{
    CancelReason, FulfillmentMethod, LineItem, Order, OrderKind, OrderStatus, PaymentMethod,
    Tracking,
};
pub use status::StatusDocument;
pub use ticket::IssuedTicket;
pub use token::{RedemptionMode, RedemptionToken};
