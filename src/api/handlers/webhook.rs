//! Payment processor webhook.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use tracing::warn;

use crate::app_state::AppState;
use crate::error::{CommerceError, ErrorResponse};
use crate::webhook::{PaymentNotification, SIGNATURE_HEADER};

/// `POST /webhooks/payments`: Receive a payment outcome notification.
///
/// The signature is verified over the raw body before anything is parsed.
///
/// # Errors
///
/// Returns [`CommerceError::InvalidSignature`] for unsigned or forged
/// requests, [`CommerceError::InvalidRequest`] for an unparseable body, and
/// [`CommerceError::Persistence`] when the store fails so the processor
/// retries.
#[utoipa::path(
    post,
    path = "/webhooks/payments",
    tag = "Webhooks",
    summary = "Payment notification",
    description = "Signed with `X-Payment-Signature: t=<unix>,v1=<hex hmac-sha256>`. Replays, unknown orders, and ignored event types are acknowledged with 200 and change nothing.",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Acknowledged"),
        (status = 400, description = "Bad signature or malformed body", body = ErrorResponse),
        (status = 500, description = "Storage failure; retry", body = ErrorResponse),
    )
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, CommerceError> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = state.webhook.verify(header, &body, Utc::now().timestamp()) {
        warn!(signed = header.is_some(), "webhook signature rejected");
        return Err(e);
    }
    let notification: PaymentNotification = serde_json::from_slice(&body)
        .map_err(|e| CommerceError::InvalidRequest(format!("malformed notification: {e}")))?;
    state.service.handle_payment_notification(notification).await?;
    Ok(StatusCode::OK)
}

/// Webhook routes, mounted outside `/api/v1` and without bearer auth.
pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/payments", post(payment_webhook))
}
