//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors, but application-level
//! errors should use `kernel::error::AppError`.

mod routes;

use anyhow::Context;
use pipeline::{LogSink, PgPipelineStore, PipelineConfig, default_pipeline};
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// Re-export unified error types for use in handlers
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

const DEFAULT_LOG_FILTER: &str = "api=info,pipeline=info,external=info,tower_http=info";

/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    let json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    init_tracing();

    let config = PipelineConfig::from_env()?;
    tracing::info!(
        environment = config.environment.code(),
        csp_enabled = config.csp.enabled,
        external_logging = config.external_log.enabled,
        trusted_proxies = ?config.trusted_proxies,
        "Configuration loaded"
    );

    // Database connection
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set in environment")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");

    let store = Arc::new(PgPipelineStore::new(pool));

    // Errors here should not prevent server startup
    if let Err(e) = store.cleanup_rate_limits().await {
        tracing::warn!(error = %e, "Rate limit cleanup failed, continuing anyway");
    }

    let sink = Arc::new(LogSink::from_config(&config.external_log)?);
    let pipeline = default_pipeline(&config, store, sink, Arc::new(routes::route_table()));

    // Build router
    let app = routes::app(&config.admin.path_prefix)?
        .layer(pipeline.layer())
        .layer(TraceLayer::new_for_http());

    // Start server
    let port = env::var("PORT")
        .ok()
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(31113);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(policies = ?pipeline.policy_names(), "Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
