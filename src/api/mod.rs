//! REST API layer: route handlers, DTOs, OpenAPI document, and router
//! composition.
//!
//! Authenticated endpoints are mounted under `/api/v1`. The payment
//! webhook and the health check live at the root, as does the `/ws`
//! status channel.

pub mod dto;
pub mod handlers;
pub mod openapi;

use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::webhook::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(openapi::swagger_ui());

    router
}

/// Builds the application: REST routes, the WebSocket channel, and the
/// HTTP middleware stack, bound to `state`.
pub fn build_app(state: AppState, request_timeout: Duration) -> Router {
    build_router()
        .route("/ws", get(ws_handler))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
