//! Checkout request and response DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::order_dto::OrderResponse;
use crate::domain::{FulfillmentMethod, PaymentMethod, PurchaseItem, Yen};
use crate::service::{CheckoutReceipt, CheckoutRequest};

/// Request body for `POST /checkout`.
///
/// ```json
/// {
///   "item": { "kind": "product", "product_id": "…" },
///   "quantity": 2,
///   "payment_method": "online",
///   "fulfillment_method": "mail"
/// }
/// ```
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutBody {
    /// What to buy.
    pub item: PurchaseItem,
    /// How many units.
    pub quantity: u32,
    /// `online` or `cash`.
    pub payment_method: PaymentMethod,
    /// `mail` or `venue`.
    pub fulfillment_method: FulfillmentMethod,
    /// Amount the client displayed. Never trusted; the server computes the total.
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub amount: Option<Yen>,
}

impl From<CheckoutBody> for CheckoutRequest {
    fn from(body: CheckoutBody) -> Self {
        Self {
            item: body.item,
            quantity: body.quantity,
            payment_method: body.payment_method,
            fulfillment_method: body.fulfillment_method,
            client_amount: body.amount,
        }
    }
}

/// Response body for `POST /checkout` (201 Created).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutResponse {
    /// The created order, including tickets issued at checkout.
    pub order: OrderResponse,
    /// Secret the client uses to complete an online payment.
    pub client_secret: Option<String>,
}

impl From<CheckoutReceipt> for CheckoutResponse {
    fn from(receipt: CheckoutReceipt) -> Self {
        Self {
            order: OrderResponse::new(&receipt.order, &receipt.tickets),
            client_secret: receipt.client_secret,
        }
    }
}
