//! WebSocket status channel.
//!
//! Clients connect to `/ws`, subscribe to the redemption tokens they hold,
//! and receive each mirrored [`crate::domain::StatusDocument`] for those
//! tokens as an `event` message instead of polling the order endpoint.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
