//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::auth::IdentityVerifier;
use crate::domain::EventBus;
use crate::service::CommerceService;
use crate::webhook::SignatureVerifier;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Commerce service for all business logic.
    pub service: Arc<CommerceService>,
    /// Bearer credential verifier used by the [`crate::auth::Actor`] extractor.
    pub identity: Arc<dyn IdentityVerifier>,
    /// Payment webhook signature verifier.
    pub webhook: SignatureVerifier,
    /// Status document bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}
