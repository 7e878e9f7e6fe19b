//! SitePulse Server - Main entry point.
//!
//! This binary starts the SitePulse realtime hub with:
//! - Structured JSON logging for production
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//!
//! # Configuration
//!
//! See [`sitepulse_server::config`] for environment variable configuration.

use std::process::ExitCode;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use sitepulse_server::config::Config;
use sitepulse_server::routes::{create_router, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables:");
            eprintln!("  SITEPULSE_USER_JWT_SECRET        - HS256 secret for end-user tokens");
            eprintln!("  SITEPULSE_CONTRIBUTOR_JWT_SECRET - HS256 secret for contributor tokens");
            eprintln!("  SITEPULSE_ADMIN_JWT_SECRET       - HS256 secret for operator tokens");
            eprintln!("  SITEPULSE_STORE_URL              - Base URL of the data-store API");
            eprintln!("  SITEPULSE_PUBLISHER_TOKEN        - Token the check scheduler presents");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  SITEPULSE_STORE_API_KEY          - Bearer key for data-store requests");
            eprintln!("  PORT                             - HTTP server port (default: 8080)");
            eprintln!("  RUST_LOG                         - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    info!(
        port = config.port,
        store_url = %config.store_url,
        "SitePulse server starting"
    );

    if let Err(err) = serve(config).await {
        error!(error = %err, "Server error");
        return ExitCode::from(1);
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Builds the hub, binds the listener, and serves until shutdown.
async fn serve(config: Config) -> anyhow::Result<()> {
    let port = config.port;
    let state = AppState::new(config).context("failed to initialize event hub")?;
    let app = create_router(state);

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(address = %bind_addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutting down gracefully");
    Ok(())
}

/// Initialize structured logging with tracing.
///
/// JSON output with environment-based filtering via `RUST_LOG`.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Creates a future that resolves when a shutdown signal is received.
///
/// Listens for:
/// - SIGTERM (container orchestrator shutdown)
/// - SIGINT (Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
