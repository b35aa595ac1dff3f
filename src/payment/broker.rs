//! Opens payment intents with a bounded wait.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::metadata::CorrelationMetadata;
use super::processor::{IntentRequest, PaymentIntent, PaymentProcessor};
use crate::domain::Order;
use crate::error::CommerceError;

/// Payment Intent Broker.
#[derive(Debug, Clone)]
pub struct PaymentBroker {
    processor: Arc<dyn PaymentProcessor>,
    currency: String,
    timeout: Duration,
}

impl PaymentBroker {
    /// Creates a broker charging in `currency` and waiting at most `timeout`
    /// for the processor.
    #[must_use]
    pub fn new(processor: Arc<dyn PaymentProcessor>, currency: &str, timeout: Duration) -> Self {
        Self {
            processor,
            currency: currency.to_string(),
            timeout,
        }
    }

    /// Currency every intent is opened in.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Opens an intent for the order's server-computed total. The order id
    /// is the idempotency key, so a retried call never opens a second intent.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::UpstreamTimeout`] when the processor does not
    /// answer within the timeout and [`CommerceError::UpstreamPaymentFailure`]
    /// when it rejects the request.
    pub async fn open_intent(&self, order: &Order) -> Result<PaymentIntent, CommerceError> {
        let metadata = CorrelationMetadata::for_order(order).ok_or_else(|| {
            CommerceError::Internal(format!("order {} has no line item", order.id))
        })?;
        let request = IntentRequest {
            amount: order.total,
            currency: self.currency.clone(),
            idempotency_key: order.id.to_string(),
            metadata,
        };

        let result = tokio::time::timeout(self.timeout, self.processor.create_intent(&request))
            .await
            .unwrap_or(Err(CommerceError::UpstreamTimeout));
        match &result {
            Ok(intent) => {
                info!(
                    order_id = %order.id,
                    intent_id = %intent.id,
                    amount = %order.total,
                    "payment intent opened"
                );
            }
            Err(e) => warn!(order_id = %order.id, error = %e, "payment intent failed"),
        }
        result
    }

    /// Cancels an intent so a released order can no longer be charged.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::UpstreamTimeout`] when the processor does not
    /// answer within the timeout and [`CommerceError::UpstreamPaymentFailure`]
    /// when it refuses, typically because the intent already succeeded.
    pub async fn cancel_intent(&self, intent_id: &str) -> Result<(), CommerceError> {
        let result = tokio::time::timeout(self.timeout, self.processor.cancel_intent(intent_id))
            .await
            .unwrap_or(Err(CommerceError::UpstreamTimeout));
        match &result {
            Ok(()) => info!(intent_id, "payment intent canceled"),
            Err(e) => warn!(intent_id, error = %e, "payment intent cancel failed"),
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{
        FulfillmentMethod, LineItem, OrderId, OrderKind, OrderStatus, PaymentMethod, ProductId,
        UserId, Yen,
    };
    use crate::payment::processor::{StubBehavior, StubPaymentProcessor};

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            buyer_id: UserId::new(),
            seller_id: UserId::new(),
            kind: OrderKind::Merchandise,
            total: Yen::new(3_000),
            platform_fee: Yen::new(300),
            payout: Yen::new(2_700),
            status: OrderStatus::Pending,
            payment_method: PaymentMethod::Online,
            fulfillment_method: FulfillmentMethod::Venue,
            shipping: None,
            payment_intent_id: None,
            processor_reference: None,
            redemption_token: None,
            tracking: None,
            redeemed_at: None,
            redeemed_by: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            line_items: vec![LineItem {
                product_id: Some(ProductId::new()),
                ticket_type_id: None,
                quantity: 2,
                unit_price: Yen::new(1_500),
                name: "Poster".into(),
            }],
        }
    }

    #[tokio::test]
    async fn charges_order_total_keyed_by_order_id() {
        let stub = Arc::new(StubPaymentProcessor::new(StubBehavior::Succeed));
        let broker = PaymentBroker::new(
            Arc::clone(&stub) as Arc<dyn PaymentProcessor>,
            "jpy",
            Duration::from_secs(1),
        );
        let order = order();

        let intent = broker.open_intent(&order).await.unwrap();
        assert!(intent.client_secret.starts_with(&intent.id));

        let requests = stub.requests().await;
        let Some(sent) = requests.first() else {
            panic!("expected one request");
        };
        assert_eq!(sent.amount, Yen::new(3_000));
        assert_eq!(sent.idempotency_key, order.id.to_string());
        assert_eq!(sent.metadata.order_id, order.id);
        assert_eq!(sent.metadata.quantity, 2);
    }

    #[tokio::test]
    async fn rejection_is_upstream_failure() {
        let stub = Arc::new(StubPaymentProcessor::new(StubBehavior::Reject));
        let broker = PaymentBroker::new(stub, "jpy", Duration::from_secs(1));
        let err = broker.open_intent(&order()).await.unwrap_err();
        assert!(matches!(err, CommerceError::UpstreamPaymentFailure(_)));
    }

    #[tokio::test]
    async fn slow_processor_times_out() {
        let stub = Arc::new(StubPaymentProcessor::new(StubBehavior::Hang));
        let broker = PaymentBroker::new(stub, "jpy", Duration::from_millis(50));
        let err = broker.open_intent(&order()).await.unwrap_err();
        assert!(matches!(err, CommerceError::UpstreamTimeout));
    }

    #[tokio::test]
    async fn cancel_reaches_processor_and_refusal_surfaces() {
        let stub = Arc::new(StubPaymentProcessor::new(StubBehavior::Succeed));
        let broker = PaymentBroker::new(
            Arc::clone(&stub) as Arc<dyn PaymentProcessor>,
            "jpy",
            Duration::from_secs(1),
        );
        broker.cancel_intent("pi_open").await.unwrap();
        assert_eq!(stub.canceled().await, vec!["pi_open".to_string()]);

        stub.refuse_cancellation();
        let err = broker.cancel_intent("pi_paid").await.unwrap_err();
        assert!(matches!(err, CommerceError::UpstreamPaymentFailure(_)));
        assert_eq!(stub.canceled().await.len(), 1);
    }

    #[tokio::test]
    async fn slow_cancel_times_out() {
        let stub = Arc::new(StubPaymentProcessor::new(StubBehavior::Hang));
        let broker = PaymentBroker::new(stub, "jpy", Duration::from_millis(50));
        let err = broker.cancel_intent("pi_open").await.unwrap_err();
        assert!(matches!(err, CommerceError::UpstreamTimeout));
    }
}
