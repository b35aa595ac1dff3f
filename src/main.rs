//! commerce-fulfillment server entry point.
//!
//! Starts the Axum HTTP server with REST, webhook, and WebSocket
//! endpoints, plus the reservation sweeper.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use commerce_fulfillment::api;
use commerce_fulfillment::app_state::AppState;
use commerce_fulfillment::auth::{IdentityVerifier, JwtVerifier};
use commerce_fulfillment::config::{AppConfig, LogFormat};
use commerce_fulfillment::domain::EventBus;
use commerce_fulfillment::payment::{
    HttpPaymentProcessor, PaymentBroker, PaymentProcessor, StubBehavior, StubPaymentProcessor,
};
use commerce_fulfillment::service::{CommerceService, spawn_reservation_sweeper};
use commerce_fulfillment::store::{CommerceStore, MemoryStore, PostgresStore};
use commerce_fulfillment::sync::{ChannelMirror, HttpDocumentMirror, StatusMirror, StatusPublisher};
use commerce_fulfillment::webhook::SignatureVerifier;

/// First retry delay for mirror writes; doubles per attempt.
const MIRROR_BACKOFF: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = AppConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting commerce-fulfillment");

    // Storage
    let store: Arc<dyn CommerceStore> = if config.persistence_enabled {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;
        let store = PostgresStore::new(pool);
        store.migrate().await?;
        tracing::info!("connected to postgres, migrations applied");
        Arc::new(store)
    } else {
        tracing::warn!("persistence disabled; using the in-process store");
        Arc::new(MemoryStore::new())
    };

    // Payment processor
    let processor: Arc<dyn PaymentProcessor> = match config.payment_api_base.as_deref() {
        Some(base) => Arc::new(HttpPaymentProcessor::new(
            base,
            &config.payment_api_key,
            config.upstream_timeout,
        )?),
        None => {
            tracing::warn!("PAYMENT_API_BASE unset; payment intents are stubbed");
            Arc::new(StubPaymentProcessor::new(StubBehavior::Succeed))
        }
    };
    let broker = PaymentBroker::new(processor, &config.payment_currency, config.upstream_timeout);

    // Status mirrors
    let event_bus = EventBus::new(config.event_bus_capacity);
    let mut mirrors: Vec<Arc<dyn StatusMirror>> =
        vec![Arc::new(ChannelMirror::new(event_bus.clone()))];
    if let Some(url) = config.status_mirror_url.as_deref() {
        mirrors.push(Arc::new(HttpDocumentMirror::new(url, config.upstream_timeout)?));
    }
    let publisher = StatusPublisher::new(mirrors, config.status_mirror_attempts, MIRROR_BACKOFF);

    // Build service layer
    let service = Arc::new(CommerceService::new(store, broker, publisher, config.commerce));
    let sweeper =
        spawn_reservation_sweeper(Arc::clone(&service), config.reservation_sweep_interval);

    // Build application state
    let identity: Arc<dyn IdentityVerifier> =
        Arc::new(JwtVerifier::new(config.jwt_secret.as_bytes()));
    let app_state = AppState {
        service,
        identity,
        webhook: SignatureVerifier::new(
            config.webhook_secret.as_bytes(),
            config.webhook_tolerance_secs,
        ),
        event_bus,
    };
    let app = api::build_app(app_state, config.request_timeout);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    sweeper.abort();
    tracing::info!("server stopped");
    Ok(())
}
