//! REST endpoint handlers organized by resource.

pub mod checkout;
pub mod orders;
pub mod redemption;
pub mod system;
pub mod webhook;

use axum::Router;

use crate::app_state::AppState;

/// Composes all authenticated resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(checkout::routes())
        .merge(orders::routes())
        .merge(redemption::routes())
}
