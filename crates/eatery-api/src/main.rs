//! Eatery API server entry point.

use std::error::Error;
use std::sync::Arc;

use eatery_api::config::AppConfig;
use eatery_api::database::PgDatabase;
use eatery_api::error::AppError;
use eatery_api::state::AppState;
use eatery_core::clock::SystemClock;
use eatery_core::registry::RegistryBuilder;
use eatery_core::snapshot::SnapshotCadence;
use eatery_event_store::pg_outbox_store::PgOutboxStore;
use eatery_event_store::schema::MIGRATOR;
use eatery_messaging::processor::{OutboxProcessor, ProcessorConfig};
use eatery_messaging::redis_broker::RedisStreamBroker;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Eatery API server");

    let config = AppConfig::from_env()?;

    // Create database connection pool and bring the schema up to date.
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(AppError::from)?;
    MIGRATOR.run(&pool).await.map_err(AppError::from)?;

    let registry = Arc::new(
        eatery_restaurants::register_types(RegistryBuilder::new())
            .build()
            .map_err(AppError::from)?,
    );

    // Relay committed outbox rows to the broker in the background.
    let broker = RedisStreamBroker::connect(&config.redis_url)
        .await
        .map_err(AppError::from)?;
    let processor = OutboxProcessor::new(
        Arc::new(PgOutboxStore::new(pool.clone(), eatery_restaurants::SCHEMA)),
        Arc::new(broker),
        ProcessorConfig {
            batch_size: config.outbox_batch_size,
            poll_interval: config.outbox_poll_interval,
            store_timeout: config.request_timeout,
            ..ProcessorConfig::default()
        },
    )
    .start();

    let app_state = AppState::new(
        Arc::new(PgDatabase::new(pool)),
        registry,
        Arc::new(SystemClock),
        SnapshotCadence::every(config.snapshot_every),
        config.request_timeout,
    );

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = eatery_api::app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_address()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(AppError::from)?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::from)?;

    // In-flight requests are done; let the current outbox cycle finish.
    match tokio::time::timeout(config.shutdown_timeout, processor.stop()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "outbox processor ended abnormally"),
        Err(_) => tracing::warn!(
            timeout = ?config.shutdown_timeout,
            "outbox processor did not stop in time"
        ),
    }

    tracing::info!("Eatery API server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
