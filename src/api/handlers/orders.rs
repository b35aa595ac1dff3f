//! Order read and administrative transition handlers.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{OrderResponse, ShipRequest};
use crate::app_state::AppState;
use crate::auth::Actor;
use crate::domain::{Order, OrderId};
use crate::error::{CommerceError, ErrorResponse};

fn order_response(order: &Order) -> Json<OrderResponse> {
    Json(OrderResponse::new(order, &[]))
}

/// `GET /orders/{id}`: Read an order with its tickets.
///
/// # Errors
///
/// Returns [`CommerceError::NotFound`] or [`CommerceError::Forbidden`].
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    tag = "Orders",
    summary = "Get order",
    description = "Returns the authoritative order state. Clients poll this when the status channel is unavailable.",
    params(("id" = uuid::Uuid, Path, description = "Order ID")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Order", body = OrderResponse),
        (status = 403, description = "Not a party to the order", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
    )
)]
pub async fn get_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<OrderResponse>, CommerceError> {
    let view = state
        .service
        .get_order(&actor, OrderId::from_uuid(id))
        .await?;
    Ok(Json(view.into()))
}

/// `POST /orders/{id}/ship`: Record shipment of a paid mail order.
///
/// # Errors
///
/// Returns [`CommerceError`] when the caller is not the seller or the
/// order is not a paid mail order.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/ship",
    tag = "Orders",
    summary = "Ship order",
    params(("id" = uuid::Uuid, Path, description = "Order ID")),
    request_body = ShipRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Order shipped", body = OrderResponse),
        (status = 400, description = "Blank carrier or tracking number", body = ErrorResponse),
        (status = 403, description = "Not the seller", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order is not a paid mail order", body = ErrorResponse),
    )
)]
pub async fn ship_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<ShipRequest>,
) -> Result<Json<OrderResponse>, CommerceError> {
    let order = state
        .service
        .ship_order(&actor, OrderId::from_uuid(id), &req.carrier, &req.tracking_number)
        .await?;
    Ok(order_response(&order))
}

/// `POST /orders/{id}/cancel`: Administrative cancellation.
///
/// # Errors
///
/// Returns [`CommerceError`] for non-admins or orders that cannot be canceled.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    tag = "Orders",
    summary = "Cancel order",
    description = "Cancels a pending or paid order with no used tickets and restores its stock.",
    params(("id" = uuid::Uuid, Path, description = "Order ID")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Order canceled", body = OrderResponse),
        (status = 403, description = "Administrator role required", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order cannot be canceled", body = ErrorResponse),
    )
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<OrderResponse>, CommerceError> {
    let order = state
        .service
        .cancel_order(&actor, OrderId::from_uuid(id))
        .await?;
    Ok(order_response(&order))
}

/// `POST /orders/{id}/refund`: Mark an order refunded.
///
/// # Errors
///
/// Returns [`CommerceError`] for non-admins or orders that cannot be refunded.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/refund",
    tag = "Orders",
    summary = "Refund order",
    description = "Status-only transition; the money movement happens at the payment processor.",
    params(("id" = uuid::Uuid, Path, description = "Order ID")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Order refunded", body = OrderResponse),
        (status = 403, description = "Administrator role required", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order cannot be refunded", body = ErrorResponse),
    )
)]
pub async fn refund_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<OrderResponse>, CommerceError> {
    let order = state
        .service
        .refund_order(&actor, OrderId::from_uuid(id))
        .await?;
    Ok(order_response(&order))
}

/// Order routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/ship", post(ship_order))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/orders/{id}/refund", post(refund_order))
}
