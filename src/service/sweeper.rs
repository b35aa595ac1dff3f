//! Releases reservations whose payment never arrived.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::CommerceService;
use crate::domain::{CancelReason, Order};
use crate::error::CommerceError;

impl CommerceService {
    /// Releases every online order still pending after the reservation TTL,
    /// restoring its stock. Cash orders are never released.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Persistence`] if the store fails.
    pub async fn release_expired_reservations(&self) -> Result<Vec<Order>, CommerceError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.settings.reservation_ttl_secs);
        let mut released = Vec::new();
        for order in self.store.expired_reservations(cutoff).await? {
            if let Some(order) = self
                .cancel_and_release(&order, CancelReason::ReservationExpired)
                .await?
            {
                info!(
                    order_id = %order.id,
                    created_at = %order.created_at,
                    "expired reservation released"
                );
                released.push(order);
            }
        }
        Ok(released)
    }

    /// Cancels the order's payment intent, then releases its reservation.
    /// While the processor refuses the cancel the order stays pending, so a
    /// payment that lands meanwhile is still honored.
    pub(super) async fn cancel_and_release(
        &self,
        order: &Order,
        reason: CancelReason,
    ) -> Result<Option<Order>, CommerceError> {
        if let Some(intent_id) = order.payment_intent_id.as_deref() {
            if let Err(e) = self.broker.cancel_intent(intent_id).await {
                warn!(
                    order_id = %order.id,
                    intent_id,
                    error = %e,
                    "reservation kept: intent still open"
                );
                return Ok(None);
            }
        }
        let released = self.store.release_order(order.id, reason).await?;
        if let Some(order) = &released {
            self.mirror(order, &[]);
        }
        Ok(released)
    }
}

/// Runs [`CommerceService::release_expired_reservations`] every `interval`.
pub fn spawn_reservation_sweeper(
    service: Arc<CommerceService>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = service.release_expired_reservations().await {
                warn!(error = %e, "reservation sweep failed");
            }
        }
    })
}
