//! Payment notification payloads.

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::Yen;
use crate::payment::CorrelationMetadata;

/// Notification type for a captured payment.
pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
/// Notification type for a failed payment.
pub const PAYMENT_FAILED: &str = "payment_intent.payment_failed";

/// What a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// The payment was captured.
    Succeeded,
    /// The payment failed.
    Failed,
    /// Any other event type; acknowledged and ignored.
    Other,
}

/// A payment notification as delivered by the processor.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentNotification {
    /// Processor event id. Differs between retries of the same outcome.
    pub id: String,
    /// Event type string.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload.
    pub data: NotificationData,
}

/// Envelope around the affected object.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationData {
    /// The payment intent the event is about.
    pub object: IntentObject,
}

/// Payment intent as echoed in a notification.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentObject {
    /// Processor intent id; the processor reference for the order.
    pub id: String,
    /// Captured amount.
    #[serde(default)]
    pub amount: Option<i64>,
    /// ISO currency code.
    #[serde(default)]
    pub currency: Option<String>,
    /// Correlation metadata set when the intent was opened.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentNotification {
    /// Classifies the event type.
    #[must_use]
    pub fn kind(&self) -> NotificationKind {
        match self.event_type.as_str() {
            PAYMENT_SUCCEEDED => NotificationKind::Succeeded,
            PAYMENT_FAILED => NotificationKind::Failed,
            _ => NotificationKind::Other,
        }
    }

    /// Decoded correlation metadata, if present and well formed.
    #[must_use]
    pub fn correlation(&self) -> Option<CorrelationMetadata> {
        CorrelationMetadata::from_map(&self.data.object.metadata)
    }

    /// The processor's intent id.
    #[must_use]
    pub fn intent_id(&self) -> &str {
        &self.data.object.id
    }

    /// Reported amount.
    #[must_use]
    pub fn amount(&self) -> Option<Yen> {
        self.data.object.amount.map(Yen::new)
    }

    /// Whether the reported currency is `expected`, ignoring case. A
    /// notification without a currency is judged on its amount alone.
    #[must_use]
    pub fn charged_in(&self, expected: &str) -> bool {
        self.data
            .object
            .currency
            .as_deref()
            .is_none_or(|c| c.eq_ignore_ascii_case(expected))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decodes_processor_payload() {
        let body = r#"{
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {"object": {
                "id": "pi_123",
                "amount": 3000,
                "currency": "jpy",
                "metadata": {
                    "order_id": "6f1c1a1e-8a52-4c4f-9b0a-0d8a3b3c2f10",
                    "buyer_id": "0b9d2a52-7f1e-4e4a-8f6c-1a2b3c4d5e6f",
                    "kind": "merchandise",
                    "item_id": "1c2d3e4f-5a6b-4c7d-8e9f-a0b1c2d3e4f5",
                    "quantity": "2"
                }
            }}
        }"#;
        let n: PaymentNotification = serde_json::from_str(body).unwrap();
        assert_eq!(n.kind(), NotificationKind::Succeeded);
        assert_eq!(n.intent_id(), "pi_123");
        assert_eq!(n.amount(), Some(Yen::new(3_000)));
        assert_eq!(n.correlation().map(|c| c.quantity), Some(2));
        assert!(n.charged_in("jpy"));
        assert!(n.charged_in("JPY"));
        assert!(!n.charged_in("usd"));
    }

    #[test]
    fn unknown_types_are_other_and_metadata_is_optional() {
        let body = r#"{"id":"evt_2","type":"charge.refunded","data":{"object":{"id":"ch_1"}}}"#;
        let n: PaymentNotification = serde_json::from_str(body).unwrap();
        assert_eq!(n.kind(), NotificationKind::Other);
        assert!(n.correlation().is_none());
    }
}
