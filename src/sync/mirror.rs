//! Mirror targets for status documents.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{EventBus, StatusDocument};
use crate::error::CommerceError;

/// A secondary, non-authoritative store of status documents.
#[async_trait]
pub trait StatusMirror: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Writes (or overwrites) the document keyed by its token.
    ///
    /// # Errors
    ///
    /// Returns an error if the mirror could not store the document.
    async fn write(&self, document: &StatusDocument) -> Result<(), CommerceError>;
}

/// Pushes documents onto the in-process [`EventBus`] that feeds the
/// WebSocket status channel.
#[derive(Debug, Clone)]
pub struct ChannelMirror {
    bus: EventBus,
}

impl ChannelMirror {
    /// Creates a mirror over `bus`.
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl StatusMirror for ChannelMirror {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn write(&self, document: &StatusDocument) -> Result<(), CommerceError> {
        let receivers = self.bus.publish(document.clone());
        tracing::trace!(token = %document.token, receivers, "status pushed to channel");
        Ok(())
    }
}

/// Stores documents in an external document service:
/// `PUT {base_url}/{token}` with the JSON document.
#[derive(Debug, Clone)]
pub struct HttpDocumentMirror {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDocumentMirror {
    /// Creates a mirror writing under `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Internal`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CommerceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CommerceError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StatusMirror for HttpDocumentMirror {
    fn name(&self) -> &'static str {
        "document-store"
    }

    async fn write(&self, document: &StatusDocument) -> Result<(), CommerceError> {
        let response = self
            .client
            .put(format!("{}/{}", self.base_url, document.token))
            .json(document)
            .send()
            .await
            .map_err(|e| CommerceError::Internal(format!("mirror write: {e}")))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(CommerceError::Internal(format!(
                "mirror answered {}",
                response.status()
            )))
        }
    }
}
