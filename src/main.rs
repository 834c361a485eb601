//! Application entry point for the `aquaflow` backend service.
//!
//! Startup sequence:
//! - Load configuration from environment variables or `.env`
//! - Initialize structured logging/tracing
//! - Load the threshold table
//! - Connect to PostgreSQL and create the schema, or fall back to the
//!   in-memory store when `DATABASE_URL` is unset
//! - Start the alert monitor on the event bus
//! - Mount all API routes and serve until SIGINT/SIGTERM
//!
//! # Environment Variables
//! See [`aquaflow::config::load_from_env`] for the service settings, plus:
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
use std::{env, sync::Arc};

use anyhow::{Context, Result};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use aquaflow::{
    config, schema, AlertDispatcher, AppState, Config, EventBus, LogPublisher, MemoryStore,
    Monitor, PgStore, PushPublisher, Store, ThresholdTable, WebhookPublisher,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let thresholds = Arc::new(ThresholdTable::load(cfg.thresholds_path.as_deref())?);
    let store = connect_store(&cfg).await?;

    let push: Arc<dyn PushPublisher> = match &cfg.push_webhook_url {
        Some(url) => Arc::new(WebhookPublisher::new(url.clone())),
        None => Arc::new(LogPublisher),
    };

    let bus = EventBus::new(cfg.event_bus_capacity);
    let dispatcher = AlertDispatcher::new(store.clone(), push);
    let monitor = Monitor::new(thresholds.clone(), dispatcher, bus.clone()).spawn();

    let app = aquaflow::app(AppState {
        store,
        thresholds,
        bus,
        report_offset: cfg.report_offset,
    });

    tracing::info!("Listening on {}", cfg.listen_addr);
    let listener = tokio::net::TcpListener::bind(cfg.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.listen_addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn connect_store(cfg: &Config) -> Result<Arc<dyn Store>> {
    // ---
    let Some(db_url) = cfg.db_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, readings and notifications are kept in memory only");
        return Ok(Arc::new(MemoryStore::new()));
    };

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(db_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;
    Ok(Arc::new(PgStore::new(pool)))
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    // ---
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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

// ---

/// Initialize the global tracing subscriber.
///
/// - Colors follow `FORCE_COLOR` (`1|true|yes` on, `0|false|no` off),
///   otherwise TTY detection
/// - `AXUM_SPAN_EVENTS`: `full`, `enter_exit`, or close events only
/// - `RUST_LOG` wins over `AXUM_LOG_LEVEL` when both are set
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=info,reqwest=info"))
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
