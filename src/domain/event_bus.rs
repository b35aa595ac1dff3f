//! Broadcast channel for status documents.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. The status
//! publisher pushes every mirrored [`StatusDocument`] through the bus, and
//! each WebSocket connection subscribes to forward the tokens its client
//! is watching.

use tokio::sync::broadcast;

use super::StatusDocument;

/// Broadcast bus for [`StatusDocument`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity.
/// When the ring buffer is full, the oldest documents are dropped for
/// lagging receivers; clients recover by polling the order endpoint.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StatusDocument>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes a document to all subscribers.
    ///
    /// Returns the number of receivers that received it. With no active
    /// receivers the document is silently dropped.
    pub fn publish(&self, document: StatusDocument) -> usize {
        self.sender.send(document).unwrap_or(0)
    }

    /// Creates a receiver for all future documents.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusDocument> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{OrderStatus, RedemptionToken};

    fn make_document() -> StatusDocument {
        StatusDocument {
            token: RedemptionToken::generate(),
            status: OrderStatus::Redeemed,
            timestamp: Utc::now(),
            redeemed_by: None,
        }
    }

    #[test]
    fn publish_without_receivers_returns_zero() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(make_document()), 0);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_document() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let doc = make_document();
        assert_eq!(bus.publish(doc.clone()), 2);

        let Ok(d1) = rx1.recv().await else {
            panic!("rx1 failed");
        };
        let Ok(d2) = rx2.recv().await else {
            panic!("rx2 failed");
        };
        assert_eq!(d1, doc);
        assert_eq!(d2, doc);
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let bus = EventBus::new(16);
        let rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);
        drop(rx1);
        assert_eq!(bus.receiver_count(), 1);
    }
}
