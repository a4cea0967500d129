//! Relay daemon - routes JSON messages to WebSocket clients
//!
//! Clients connect to `/ws?userId=..&sessionId=..` and receive every message
//! addressed to their user or session. Backend services push messages through
//! the admin API using a shared key.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default port (8081)
//! HUB_API_KEY=secret relayd
//!
//! # Custom port and timeouts
//! HUB_API_KEY=secret relayd --port 9000 --read-timeout 30s
//!
//! # Enable debug logging
//! RUST_LOG=relayd=debug HUB_API_KEY=secret relayd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: close every connection, then stop the HTTP server

use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use relayd::config::Config;
use relayd::hub::spawn_hub;
use relayd::server::RelayServer;

/// Upper bound on the graceful HTTP shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("relayd=info".parse()?)
                .add_directive("relay=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e).context("Invalid configuration");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Relay daemon starting"
    );

    let hub = spawn_hub(config.hub_config());
    info!(
        outbound_capacity = config.outbound_capacity,
        "Hub event loop started"
    );

    let addr = config.socket_addr();
    let listener = RelayServer::bind(addr)
        .await
        .with_context(|| format!("Failed to listen on {addr}"))?;

    let cancel_token = CancellationToken::new();
    let server = RelayServer::new(hub.clone(), config.server_config(), cancel_token.clone());
    let mut server_task = tokio::spawn(async move { server.run(listener).await });

    tokio::select! {
        signal = wait_for_shutdown_signal() => {
            if let Err(e) = signal {
                error!(error = %e, "Error waiting for shutdown signal");
            }
            info!("Shutdown signal received");
        }
        result = &mut server_task => {
            // Server exited on its own; still close every client.
            hub.shutdown().await;
            return result
                .context("Server task panicked")?
                .context("Server error");
        }
    }

    hub.shutdown().await;
    info!("All connections closed");

    cancel_token.cancel();
    match tokio::time::timeout(SHUTDOWN_GRACE, server_task).await {
        Ok(joined) => joined
            .context("Server task panicked")?
            .context("Server error")?,
        Err(_) => warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Server did not stop within the grace period"
        ),
    }

    info!("Relay daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
