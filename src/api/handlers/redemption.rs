//! Redemption handler used by venue scanners.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{RedeemRequest, RedemptionResponse};
use crate::app_state::AppState;
use crate::auth::Actor;
use crate::error::{CommerceError, ErrorResponse};

/// `POST /redemptions`: Redeem a scanned token.
///
/// # Errors
///
/// Returns [`CommerceError`] for unknown tokens, the wrong mode,
/// unauthorized scanners, repeat scans, and unredeemable orders.
#[utoipa::path(
    post,
    path = "/api/v1/redemptions",
    tag = "Redemption",
    summary = "Redeem a token",
    description = "Marks a merchandise order or an issued ticket as redeemed exactly once. A token presented in the wrong mode yields 422 with `details` naming the correct mode.",
    request_body = RedeemRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Redeemed", body = RedemptionResponse),
        (status = 401, description = "Missing or invalid credential", body = ErrorResponse),
        (status = 403, description = "Not the seller or an admin", body = ErrorResponse),
        (status = 404, description = "Unknown token", body = ErrorResponse),
        (status = 409, description = "Already redeemed or not redeemable", body = ErrorResponse),
        (status = 422, description = "Token belongs to the other mode", body = ErrorResponse),
    )
)]
pub async fn redeem(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<RedemptionResponse>, CommerceError> {
    let receipt = state.service.redeem(&actor, &req.token, req.mode).await?;
    Ok(Json(receipt.into()))
}

/// Redemption routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/redemptions", post(redeem))
}
