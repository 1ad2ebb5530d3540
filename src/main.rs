//! Application entry point for the `airwatch` air-quality backend.
//!
//! Startup sequence:
//! - Load configuration from environment variables or `.env`
//! - Initialize structured logging/tracing
//! - Establish a PostgreSQL connection pool and create the schema
//! - Build the sync service around the AQICN client and start the hourly
//!   scheduler
//! - Mount all API routes via the `routes` gateway and serve until SIGINT or
//!   SIGTERM, then stop the scheduler
//!
//! # Environment Variables
//! - `DATABASE_URL`, `JWT_SECRET`, `AQICN_API_TOKEN` (**required**)
//! - `BIND_ADDR`, `DB_POOL_MAX`, `JWT_TTL_SECS`, `AQICN_API_URL`,
//!   `PROVIDER_TIMEOUT_SECS`, `SYNC_*` (optional, see `config`)
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
use std::{env, sync::Arc};

use anyhow::Result;
use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

mod auth;
mod config;
mod models;
mod provider;
mod response;
mod routes;
mod schema;
mod store;
mod sync;

use auth::TokenKeys;
use provider::{aqicn::AQICN_SOURCE, AqicnClient};
use routes::AppState;
use store::PgStore;
use sync::{Scheduler, SyncService};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let masked_url = config::mask_db_url(&cfg.db_url);
    tracing::info!("Attempting to connect to database: {}", masked_url);

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database '{}': {}", masked_url, e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    let store = PgStore::new(pool);
    let shared = Arc::new(store.clone());
    let provider = AqicnClient::new(&cfg.provider_url, cfg.provider_token.clone(), cfg.provider_timeout)?;
    let sync_service = Arc::new(SyncService::new(
        shared.clone(),
        shared.clone(),
        shared,
        Arc::new(provider),
        cfg.sync.clone(),
    ));

    let mut scheduler = Scheduler::new(Arc::clone(&sync_service), AQICN_SOURCE);
    scheduler.start(cfg.sync.interval);

    let state = AppState {
        store,
        sync: sync_service,
        tokens: Arc::new(TokenKeys::new(&cfg.jwt_secret, cfg.jwt_ttl)),
    };

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(state);

    tracing::info!("Listening on {}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    if scheduler.is_running() {
        tracing::info!("Stopping sync scheduler");
    }
    scheduler.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

// ---

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    // ---
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, falling back to the `AXUM_LOG_LEVEL`
///   env var; `sqlx` statements, `hyper` and `reqwest` are held at quieter levels
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked. It installs the subscriber globally
/// for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to AXUM_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(default_filter(env::var("AXUM_LOG_LEVEL").ok().as_deref()))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}

/// Filter directives for an `AXUM_LOG_LEVEL` value; unknown values mean `debug`.
fn default_filter(level: Option<&str>) -> String {
    // ---
    let level = match level {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") => "warn",
        Some("error") => "error",
        _ => "debug",
    };
    format!("{level},sqlx::query=warn,hyper=info,reqwest=info")
}
