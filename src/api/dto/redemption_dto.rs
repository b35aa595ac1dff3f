//! Redemption request and response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{OrderStatus, RedemptionMode};
use crate::service::RedemptionReceipt;

/// Request body for `POST /redemptions`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RedeemRequest {
    /// Token scanned from the buyer's QR code.
    pub token: String,
    /// Scanner mode the operator selected.
    pub mode: RedemptionMode,
}

/// Summary of the redeemed entity.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RedemptionResponse {
    /// Mode the token was redeemed in.
    pub mode: RedemptionMode,
    /// Order the entity belongs to.
    pub order_id: uuid::Uuid,
    /// Ticket redeemed, in ticket mode.
    pub ticket_id: Option<uuid::Uuid>,
    /// Seat label, in ticket mode.
    pub seat_label: Option<String>,
    /// Status after redemption.
    pub status: OrderStatus,
    /// Redemption time.
    pub redeemed_at: DateTime<Utc>,
    /// Operator who scanned the token.
    pub redeemed_by: uuid::Uuid,
}

impl From<RedemptionReceipt> for RedemptionResponse {
    fn from(r: RedemptionReceipt) -> Self {
        Self {
            mode: r.mode,
            order_id: *r.order_id.as_uuid(),
            ticket_id: r.ticket_id.map(|id| *id.as_uuid()),
            seat_label: r.seat_label,
            status: r.status,
            redeemed_at: r.redeemed_at,
            redeemed_by: *r.redeemed_by.as_uuid(),
        }
    }
}
