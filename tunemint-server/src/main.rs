//! tunemint-server - TuneMint HTTP API
//!
//! Loads the TOML configuration (overlaid by environment variables and
//! command-line flags), opens the JSON store, resumes unfinished generation
//! monitors and serves the API until Ctrl+C or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tunemint_common::config::TomlConfig;
use tunemint_server::services::generation;
use tunemint_server::{build_router, AppState};

/// How often idle rate-limit windows are dropped
const LIMITER_PURGE_INTERVAL: Duration = Duration::from_secs(300);

/// Command-line arguments for tunemint-server
#[derive(Parser, Debug)]
#[command(name = "tunemint-server")]
#[command(about = "TuneMint music generation and community API")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "TUNEMINT_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// Data directory, overrides the config file
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.apply_env().context("Invalid environment configuration")?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }
    config.validate().context("Invalid configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting TuneMint server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if config.admin_secret == 0 {
        warn!("Admin authentication disabled (admin_secret = 0)");
    }

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.bind_addr))?;

    let state = AppState::new(config)
        .await
        .context("Failed to initialize application state")?;

    match generation::resume_unfinished(&state).await {
        Ok(0) => {}
        Ok(n) => info!("Resumed {} unfinished generation jobs", n),
        Err(e) => error!("Failed to resume generation jobs: {}", e),
    }

    spawn_limiter_purge(&state);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("tunemint-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn spawn_limiter_purge(state: &AppState) {
    let gen_limiter = state.gen_limiter.clone();
    let chat_limiter = state.chat_limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LIMITER_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = gen_limiter.purge_expired().await + chat_limiter.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "Purged expired rate-limit windows");
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
