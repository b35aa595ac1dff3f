//! Commerce error types with HTTP status code mapping.
//!
//! [`CommerceError`] is the central error type. Each variant maps to a
//! numeric error code, an HTTP status, and a structured JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{OrderStatus, RedemptionMode};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 4001,
///     "message": "insufficient stock",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see the ranges on [`CommerceError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Machine-readable hint, e.g. the redemption mode a token belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Service error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category            | HTTP Status                   |
/// |-----------|---------------------|-------------------------------|
/// | 1000–1999 | Request / identity  | 400 / 401 / 403               |
/// | 2000–2999 | State / Not Found   | 404 Not Found / 409 Conflict  |
/// | 3000–3999 | Server              | 500 Internal Server Error     |
/// | 4000–4999 | Business rule       | 422 Unprocessable Entity      |
/// | 5000–5999 | Upstream processor  | 502 / 504                     |
#[derive(Debug, thiserror::Error)]
pub enum CommerceError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or invalid bearer credential.
    #[error("unauthorized")]
    Unauthorized,

    /// The actor may not act on this entity.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Webhook signature missing, malformed, stale, or wrong.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Entity not found.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Token has already been redeemed.
    #[error("already redeemed")]
    AlreadyRedeemed,

    /// Status change not allowed from the current state.
    #[error("cannot move order from {} to {}", from.as_str(), to.as_str())]
    InvalidTransition {
        /// Current status.
        from: OrderStatus,
        /// Requested status.
        to: OrderStatus,
    },

    /// Not enough stock or capacity for the requested quantity.
    #[error("insufficient stock")]
    InsufficientStock,

    /// Mail fulfillment requested without a shipping address on file.
    #[error("no shipping address on file")]
    MissingShippingAddress,

    /// Token belongs to the other redemption mode.
    #[error("token belongs to {} redemption", actual.as_str())]
    WrongRedemptionMode {
        /// Mode the token actually belongs to.
        actual: RedemptionMode,
    },

    /// Payment processor rejected or failed the request.
    #[error("payment processor failure: {0}")]
    UpstreamPaymentFailure(String),

    /// Payment processor did not answer in time.
    #[error("payment processor timed out")]
    UpstreamTimeout,

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CommerceError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidSignature => 1002,
            Self::Unauthorized => 1003,
            Self::Forbidden(_) => 1004,
            Self::NotFound(_) => 2001,
            Self::AlreadyRedeemed => 2002,
            Self::InvalidTransition { .. } => 2003,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::InsufficientStock => 4001,
            Self::MissingShippingAddress => 4002,
            Self::WrongRedemptionMode { .. } => 4003,
            Self::UpstreamPaymentFailure(_) => 5001,
            Self::UpstreamTimeout => 5002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidSignature => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyRedeemed | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::InsufficientStock
            | Self::MissingShippingAddress
            | Self::WrongRedemptionMode { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UpstreamPaymentFailure(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the buyer may simply retry the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamPaymentFailure(_) | Self::UpstreamTimeout)
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::WrongRedemptionMode { actual } => Some(actual.as_str().to_string()),
            Self::UpstreamPaymentFailure(_) | Self::UpstreamTimeout => Some("retry".to_string()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for CommerceError {
    fn from(e: sqlx::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl IntoResponse for CommerceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
