//! OpenAPI document for the REST surface.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use super::dto::{
    CheckoutBody, CheckoutResponse, LineItemDto, OrderResponse, RedeemRequest, RedemptionResponse,
    ShipRequest, TicketDto,
};
use super::handlers::{checkout, orders, redemption, system, webhook};
use crate::domain::{
    CancelReason, FulfillmentMethod, OrderKind, OrderStatus, PaymentMethod, PurchaseItem,
    RedemptionMode, ShippingAddress, ShippingSnapshot, StatusDocument, Tracking,
};
use crate::error::{ErrorBody, ErrorResponse};

/// Generated OpenAPI document.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "Commerce Fulfillment API",
        description = "Checkout, payment confirmation, and redemption for merchandise and event tickets."
    ),
    paths(
        checkout::checkout,
        orders::get_order,
        orders::ship_order,
        orders::cancel_order,
        orders::refund_order,
        redemption::redeem,
        webhook::payment_webhook,
        system::health_handler,
    ),
    components(schemas(
        CheckoutBody,
        CheckoutResponse,
        OrderResponse,
        LineItemDto,
        TicketDto,
        ShipRequest,
        RedeemRequest,
        RedemptionResponse,
        StatusDocument,
        PurchaseItem,
        OrderStatus,
        OrderKind,
        PaymentMethod,
        FulfillmentMethod,
        CancelReason,
        RedemptionMode,
        ShippingAddress,
        ShippingSnapshot,
        Tracking,
        ErrorResponse,
        ErrorBody,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "Checkout", description = "Order creation"),
        (name = "Orders", description = "Order reads and administrative transitions"),
        (name = "Redemption", description = "Pickup and entry scans"),
        (name = "Webhooks", description = "Payment processor notifications"),
        (name = "System", description = "Health"),
    )
)]
pub struct ApiDoc;

#[derive(Debug)]
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Swagger UI at `/swagger-ui`, serving the document at `/api-docs/openapi.json`.
#[cfg(feature = "swagger-ui")]
pub fn swagger_ui() -> utoipa_swagger_ui::SwaggerUi {
    utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
}
