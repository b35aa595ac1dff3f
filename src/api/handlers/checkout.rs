//! Checkout handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{CheckoutBody, CheckoutResponse};
use crate::app_state::AppState;
use crate::auth::Actor;
use crate::error::{CommerceError, ErrorResponse};

/// `POST /checkout`: Reserve stock and create an order.
///
/// # Errors
///
/// Returns [`CommerceError`] on validation, stock, address, or upstream
/// payment failures.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    tag = "Checkout",
    summary = "Create an order",
    description = "Atomically reserves stock and creates the order with price snapshots. Online payments also open a processor intent for the server-computed total and return its client secret; a failed intent releases the reservation. Cash ticket purchases are issued immediately.",
    request_body = CheckoutBody,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Order created", body = CheckoutResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Missing or invalid credential", body = ErrorResponse),
        (status = 403, description = "Seller buying their own listing", body = ErrorResponse),
        (status = 404, description = "Unknown product or ticket type", body = ErrorResponse),
        (
            status = 422,
            description = "Insufficient stock or missing shipping address",
            body = ErrorResponse
        ),
        (status = 502, description = "Payment processor rejected the intent", body = ErrorResponse),
        (status = 504, description = "Payment processor timed out", body = ErrorResponse),
    )
)]
pub async fn checkout(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<CheckoutBody>,
) -> Result<impl IntoResponse, CommerceError> {
    let receipt = state.service.checkout(&actor, body.into()).await?;
    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(receipt))))
}

/// Checkout routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/checkout", post(checkout))
}
