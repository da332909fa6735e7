//! Nimbus Orchestrator Daemon
//!
//! Provisions ephemeral compute nodes through the configured VM provider,
//! tracks their liveness in the TTL registry, and proxies client traffic
//! to them.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nb_core::config::Config;
use nb_core::registry::NodeRegistry;
use nb_provider::build_provider;
use nb_server::{router, AppState};

#[derive(Parser)]
#[command(name = "nimbus-server")]
#[command(about = "Nimbus fleet orchestrator daemon")]
#[command(version)]
struct Args {
    /// Bind address (overrides NIMBUS_BIND)
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Nimbus orchestrator starting...");

    let config = Config::from_env().context("Failed to load configuration")?;
    let bind_addr = args.bind.unwrap_or_else(|| config.bind_address.clone());

    let registry = Arc::new(NodeRegistry::new(config.node_ttl));
    let provider =
        build_provider(&config, Arc::clone(&registry)).context("Failed to build VM provider")?;

    let state = AppState::new(registry, provider);
    let app = router(state);

    // Graceful shutdown on Ctrl+C / SIGTERM
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;
    tracing::info!("HTTP surface listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("server error")?;

    tracing::info!("Orchestrator shutdown complete");
    Ok(())
}
