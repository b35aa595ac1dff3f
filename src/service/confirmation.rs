//! Webhook Confirmation Handler.
//!
//! Notifications are delivered at least once and possibly out of order.
//! Every branch is a function of the current stored state plus the
//! notification, so replays are silent no-ops and nothing here is ever
//! reported back to the processor as an error except storage failures,
//! which it should retry.

use tracing::{debug, error, info, warn};

use super::CommerceService;
use crate::domain::{CancelReason, OrderId};
use crate::error::CommerceError;
use crate::store::{ConfirmationOutcome, PaymentConfirmation, releasable};
use crate::webhook::{NotificationKind, PaymentNotification};

/// What a notification changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// The order moved to `paid`.
    Confirmed {
        /// Order paid.
        order_id: OrderId,
        /// Tickets minted.
        tickets_issued: usize,
    },
    /// The pending reservation was released after a failed payment.
    Released(OrderId),
    /// Nothing changed.
    NoChange,
}

impl CommerceService {
    async fn correlate(
        &self,
        notification: &PaymentNotification,
    ) -> Result<Option<OrderId>, CommerceError> {
        if let Some(meta) = notification.correlation() {
            return Ok(Some(meta.order_id));
        }
        Ok(self
            .store
            .find_order_by_intent(notification.intent_id())
            .await?
            .map(|o| o.id))
    }

    /// Applies a verified payment notification.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Persistence`] if the store fails; every
    /// other situation is acknowledged without error.
    pub async fn handle_payment_notification(
        &self,
        notification: PaymentNotification,
    ) -> Result<NotificationOutcome, CommerceError> {
        let kind = notification.kind();
        if kind == NotificationKind::Other {
            debug!(
                event_id = %notification.id,
                event_type = %notification.event_type,
                "notification ignored"
            );
            return Ok(NotificationOutcome::NoChange);
        }
        let Some(order_id) = self.correlate(&notification).await? else {
            warn!(
                event_id = %notification.id,
                intent_id = notification.intent_id(),
                "notification matches no order"
            );
            return Ok(NotificationOutcome::NoChange);
        };

        if kind == NotificationKind::Failed {
            return self.release_after_failure(order_id).await;
        }

        let expected = self.broker.currency();
        if !notification.charged_in(expected) {
            error!(
                %order_id,
                expected,
                received = notification.data.object.currency.as_deref(),
                "confirmation currency mismatch ignored"
            );
            return Ok(NotificationOutcome::NoChange);
        }

        let outcome = self
            .store
            .confirm_payment(PaymentConfirmation {
                order_id,
                processor_reference: notification.intent_id().to_string(),
                amount: notification.amount(),
            })
            .await?;

        match outcome {
            ConfirmationOutcome::Confirmed { order, tickets } => {
                info!(
                    %order_id,
                    reference = notification.intent_id(),
                    tickets = tickets.len(),
                    "payment confirmed"
                );
                self.mirror(&order, &tickets);
                Ok(NotificationOutcome::Confirmed {
                    order_id,
                    tickets_issued: tickets.len(),
                })
            }
            ConfirmationOutcome::Duplicate => {
                debug!(
                    %order_id,
                    reference = notification.intent_id(),
                    "duplicate confirmation ignored"
                );
                Ok(NotificationOutcome::NoChange)
            }
            ConfirmationOutcome::UnknownOrder => {
                warn!(%order_id, "confirmation for unknown order ignored");
                Ok(NotificationOutcome::NoChange)
            }
            ConfirmationOutcome::NotPending(status) => {
                info!(
                    %order_id,
                    status = status.as_str(),
                    "confirmation for non-pending order ignored"
                );
                Ok(NotificationOutcome::NoChange)
            }
            ConfirmationOutcome::AmountMismatch { expected, received } => {
                error!(%order_id, %expected, %received, "confirmation amount mismatch ignored");
                Ok(NotificationOutcome::NoChange)
            }
            ConfirmationOutcome::LateForReleasedOrder(order) => {
                error!(
                    %order_id,
                    reference = notification.intent_id(),
                    total = %order.total,
                    "payment captured for a released order; refund required"
                );
                Ok(NotificationOutcome::NoChange)
            }
        }
    }

    /// Releases a pending order after a failed payment, once its intent is
    /// canceled with the processor.
    async fn release_after_failure(
        &self,
        order_id: OrderId,
    ) -> Result<NotificationOutcome, CommerceError> {
        let Some(order) = self.store.find_order(order_id).await?.filter(releasable) else {
            debug!(%order_id, "payment failure for non-pending order ignored");
            return Ok(NotificationOutcome::NoChange);
        };
        match self
            .cancel_and_release(&order, CancelReason::PaymentFailed)
            .await?
        {
            Some(_) => {
                info!(%order_id, "payment failed; reservation released");
                Ok(NotificationOutcome::Released(order_id))
            }
            None => Ok(NotificationOutcome::NoChange),
        }
    }
}
