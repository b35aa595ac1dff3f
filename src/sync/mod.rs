//! Status Sync Publisher.
//!
//! After a transition commits, the affected redemption tokens' status
//! documents are written to every configured [`StatusMirror`]. Writes run
//! in a spawned task and never feed back into the originating request:
//! failures are retried a bounded number of times, then logged. Clients
//! that miss a push fall back to polling the order endpoint.

pub mod mirror;
pub mod publisher;

pub use mirror::{ChannelMirror, HttpDocumentMirror, StatusMirror};
pub use publisher::StatusPublisher;
