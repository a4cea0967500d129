//! HTTP and WebSocket server for the relay.
//!
//! The server:
//! - Upgrades `GET /ws?userId=..&sessionId=..` to a WebSocket and runs the
//!   per-connection read/write pumps
//! - Serves the admin API (`POST /api/send`, `POST /api/broadcast`) behind
//!   the `X-API-Key` shared secret
//! - Serves `GET /health` without authentication
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   RelayServer   │
//! │  (axum Router)  │
//! └───────┬─────────┘
//!         │
//!    ┌────┴─────────────┬──────────────┐
//!    ▼                  ▼              ▼
//! ┌────────┐      ┌───────────┐   ┌─────────┐
//! │  /ws   │      │  /api/*   │   │ /health │
//! │ pumps  │      │ (api key) │   │ (stats) │
//! └───┬────┘      └─────┬─────┘   └────┬────┘
//!     │                 │              │
//!     └────────┬────────┘              │
//!              ▼                       ▼
//!       ┌─────────────┐        ┌─────────────┐
//!       │  HubHandle  │        │ StatsReader │
//!       └─────────────┘        └─────────────┘
//! ```

mod api;
mod websocket;

pub use api::{ApiError, API_KEY_HEADER};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::hub::HubHandle;

/// Upper bound on the keepalive ping interval.
pub const MAX_PING_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Transport and admin-surface settings.
#[derive(Clone)]
pub struct ServerConfig {
    /// Shared secret expected in `X-API-Key`
    pub api_key: String,
    /// Idle read deadline per connection; pings go out at 9/10 of it
    pub read_timeout: Duration,
    /// Deadline for each outbound frame
    pub write_timeout: Duration,
    /// Maximum inbound WebSocket message size in bytes
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Interval between keepalive pings.
    ///
    /// Never panics; very large read timeouts are capped at
    /// [`MAX_PING_INTERVAL`].
    pub fn ping_interval(&self) -> Duration {
        self.read_timeout
            .checked_mul(9)
            .map_or(self.read_timeout, |d| d / 10)
            .clamp(Duration::from_millis(1), MAX_PING_INTERVAL)
    }
}

/// State shared with every handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub config: Arc<ServerConfig>,
}

/// Builds the router with all routes.
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/send", post(api::send_message))
        .route("/broadcast", post(api::broadcast))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::require_api_key,
        ));

    Router::new()
        .route("/ws", get(websocket::ws_handler))
        .route("/health", get(api::health))
        .nest("/api", admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The relay's HTTP server.
pub struct RelayServer {
    state: AppState,
    cancel_token: CancellationToken,
}

impl RelayServer {
    /// Creates a server.
    ///
    /// # Arguments
    ///
    /// * `hub` - Handle to the running hub
    /// * `config` - Transport and admin settings
    /// * `cancel_token` - Token for graceful shutdown
    pub fn new(hub: HubHandle, config: ServerConfig, cancel_token: CancellationToken) -> Self {
        Self {
            state: AppState {
                hub,
                config: Arc::new(config),
            },
            cancel_token,
        }
    }

    /// Returns the router (useful for in-process testing).
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Binds a TCP listener.
    pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
        TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Serves until the cancellation token is triggered.
    pub async fn run(&self, listener: TcpListener) -> Result<(), ServerError> {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "Relay server listening");
        }

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel_token.cancelled().await })
            .await
            .map_err(ServerError::Serve)?;

        info!("Relay server stopped");
        Ok(())
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(read_timeout: Duration) -> ServerConfig {
        ServerConfig {
            api_key: "k".to_string(),
            read_timeout,
            write_timeout: Duration::from_secs(1),
            max_message_size: 1024,
        }
    }

    #[test]
    fn test_ping_interval_is_nine_tenths_of_read_timeout() {
        assert_eq!(
            config(Duration::from_secs(60)).ping_interval(),
            Duration::from_secs(54)
        );
        assert!(!config(Duration::from_nanos(1)).ping_interval().is_zero());
    }

    #[test]
    fn test_ping_interval_survives_huge_read_timeout() {
        let huge = crate::config::parse_duration("3000000000000000000s").unwrap();
        assert_eq!(config(huge).ping_interval(), MAX_PING_INTERVAL);
        assert_eq!(config(Duration::MAX).ping_interval(), MAX_PING_INTERVAL);

        // The write pump schedules its first ping at now + interval.
        let start = tokio::time::Instant::now();
        assert!(start.checked_add(config(Duration::MAX).ping_interval()).is_some());
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:8081".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:8081"));
        assert!(err.to_string().contains("in use"));
    }
}
