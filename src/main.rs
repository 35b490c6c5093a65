//! review-engine server entry point.
//!
//! Starts the Axum HTTP server, the webhook and invitation workers, and the
//! forwarder that turns lifecycle events into webhook deliveries.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use review_engine::api;
use review_engine::app_state::{AppState, Backends};
use review_engine::config::EngineConfig;
use review_engine::domain::EventBus;
use review_engine::persistence::postgres;
use review_engine::service::{HttpTransport, LogMailer, worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = EngineConfig::from_env().context("invalid LISTEN_ADDR")?;
    tracing::info!(addr = %config.listen_addr, "starting review-engine");

    // Build persistence layer
    let backends = if config.persistence_enabled {
        let pool = postgres::connect(&config)
            .await
            .context("connecting to PostgreSQL")?;
        postgres::migrate(&pool).await.context("running migrations")?;
        tracing::info!("using PostgreSQL persistence");
        Backends::postgres(pool, config.queue_lease())
    } else {
        tracing::warn!("persistence disabled, state is kept in memory only");
        Backends::in_memory()
    };

    // Build service layer
    let event_bus = EventBus::new(config.event_bus_capacity);
    let transport = HttpTransport::new(
        config.webhook_request_timeout(),
        config.webhook_connect_timeout(),
    )?;
    let app_state = AppState::build(
        &backends,
        event_bus.clone(),
        Arc::new(transport),
        Arc::new(LogMailer),
        &config,
    );

    // Start background tasks
    let _forwarder = worker::spawn_event_forwarder(Arc::clone(&app_state.webhooks), &event_bus);
    let _webhook_worker = worker::spawn_webhook_worker(
        Arc::clone(&app_state.webhooks),
        Arc::clone(&backends.webhook_queue),
        config.worker_poll_interval(),
    );
    let _invitation_worker = worker::spawn_invitation_worker(
        Arc::clone(&app_state.invitations),
        Arc::clone(&backends.invitation_queue),
        config.worker_poll_interval(),
    );

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
