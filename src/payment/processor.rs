//! The external payment processor.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::metadata::CorrelationMetadata;
use crate::domain::Yen;
use crate::error::CommerceError;

/// Request to open a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRequest {
    /// Amount to charge, computed server-side.
    pub amount: Yen,
    /// ISO currency code.
    pub currency: String,
    /// Key the processor uses to deduplicate retried requests.
    pub idempotency_key: String,
    /// Correlation metadata echoed back in notifications.
    pub metadata: CorrelationMetadata,
}

/// A processor-side payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Processor intent id.
    pub id: String,
    /// Secret the client uses to complete payment.
    pub client_secret: String,
}

/// Opens and cancels payment intents with an external processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync + fmt::Debug {
    /// Opens an intent for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::UpstreamPaymentFailure`] when the processor
    /// rejects or cannot be reached, [`CommerceError::UpstreamTimeout`] when
    /// it does not answer in time.
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, CommerceError>;

    /// Cancels an open intent so it can no longer be paid.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::UpstreamPaymentFailure`] when the processor
    /// refuses (for example because the intent already succeeded) or cannot
    /// be reached, [`CommerceError::UpstreamTimeout`] when it does not
    /// answer in time.
    async fn cancel_intent(&self, intent_id: &str) -> Result<(), CommerceError>;
}

#[derive(Serialize)]
struct CreateIntentBody<'a> {
    amount: i64,
    currency: &'a str,
    metadata: HashMap<String, String>,
}

/// Processor reached over HTTP: `POST {base}/v1/payment_intents` and
/// `POST {base}/v1/payment_intents/{id}/cancel`.
#[derive(Debug, Clone)]
pub struct HttpPaymentProcessor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentProcessor {
    /// Creates a client for the processor at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Internal`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, CommerceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CommerceError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

fn upstream(e: &reqwest::Error) -> CommerceError {
    if e.is_timeout() {
        CommerceError::UpstreamTimeout
    } else {
        CommerceError::UpstreamPaymentFailure(e.to_string())
    }
}

#[async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, CommerceError> {
        let body = CreateIntentBody {
            amount: request.amount.get(),
            currency: &request.currency,
            metadata: request.metadata.to_map(),
        };
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| upstream(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CommerceError::UpstreamPaymentFailure(format!(
                "processor answered {status}"
            )));
        }
        response
            .json::<PaymentIntent>()
            .await
            .map_err(|e| upstream(&e))
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<(), CommerceError> {
        let response = self
            .client
            .post(format!("{}/v1/payment_intents/{intent_id}/cancel", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| upstream(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CommerceError::UpstreamPaymentFailure(format!(
                "processor refused cancel with {status}"
            )));
        }
        Ok(())
    }
}

/// How [`StubPaymentProcessor`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StubBehavior {
    /// Returns a fresh intent.
    #[default]
    Succeed,
    /// Fails as if the processor rejected the request.
    Reject,
    /// Never answers.
    Hang,
}

/// In-process processor for local development and tests.
#[derive(Debug, Default)]
pub struct StubPaymentProcessor {
    behavior: StubBehavior,
    requests: Mutex<Vec<IntentRequest>>,
    canceled: Mutex<Vec<String>>,
    refuse_cancel: AtomicBool,
}

impl StubPaymentProcessor {
    /// Creates a stub with the given behavior.
    #[must_use]
    pub fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    /// Requests received so far.
    pub async fn requests(&self) -> Vec<IntentRequest> {
        self.requests.lock().await.clone()
    }

    /// Intents canceled so far.
    pub async fn canceled(&self) -> Vec<String> {
        self.canceled.lock().await.clone()
    }

    /// Makes later cancel calls fail, as the processor does for an intent
    /// that has already succeeded.
    pub fn refuse_cancellation(&self) {
        self.refuse_cancel.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentProcessor for StubPaymentProcessor {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, CommerceError> {
        self.requests.lock().await.push(request.clone());
        match self.behavior {
            StubBehavior::Succeed => {
                let id = format!("pi_{}", uuid::Uuid::new_v4().simple());
                Ok(PaymentIntent {
                    client_secret: format!("{id}_secret_{}", uuid::Uuid::new_v4().simple()),
                    id,
                })
            }
            StubBehavior::Reject => Err(CommerceError::UpstreamPaymentFailure(
                "card_declined".into(),
            )),
            StubBehavior::Hang => {
                std::future::pending::<()>().await;
                Err(CommerceError::UpstreamTimeout)
            }
        }
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<(), CommerceError> {
        if self.refuse_cancel.load(Ordering::SeqCst) {
            return Err(CommerceError::UpstreamPaymentFailure(
                "intent cannot be canceled".into(),
            ));
        }
        match self.behavior {
            StubBehavior::Succeed => {
                self.canceled.lock().await.push(intent_id.to_string());
                Ok(())
            }
            StubBehavior::Reject => Err(CommerceError::UpstreamPaymentFailure(
                "processor unavailable".into(),
            )),
            StubBehavior::Hang => {
                std::future::pending::<()>().await;
                Err(CommerceError::UpstreamTimeout)
            }
        }
    }
}
