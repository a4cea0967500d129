//! Client interface for interacting with the HubActor.
//!
//! The `HubHandle` is a cheap-to-clone interface handed to every collaborator
//! (WebSocket acceptor, admin API, process shutdown). Submissions await both
//! intake and application, so a caller cannot outrun the event loop.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `HubError::ShuttingDown`

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use relay_core::{SessionId, UserId};
use relay_protocol::{Message, RoutingRequest, StatsSnapshot};

use super::commands::{HubCommand, HubError};
use super::connection::{Connection, Outbound};
use super::dispatcher::{BroadcastOutcome, RouteOutcome};
use super::stats::StatsReader;

/// Handle for interacting with the hub actor.
#[derive(Clone)]
pub struct HubHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<HubCommand>,

    /// Lock-based statistics reader (bypasses the event loop)
    stats: StatsReader,

    /// Requests shutdown
    cancel_token: CancellationToken,

    /// Cancelled by the actor after its shutdown sweep
    stopped: CancellationToken,

    /// Outbound queue capacity for connections created by `connect`
    outbound_capacity: usize,
}

impl HubHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<HubCommand>,
        stats: StatsReader,
        cancel_token: CancellationToken,
        stopped: CancellationToken,
        outbound_capacity: usize,
    ) -> Self {
        Self {
            sender,
            stats,
            cancel_token,
            stopped,
            outbound_capacity,
        }
    }

    /// Creates a connection with the configured queue capacity and registers it.
    ///
    /// Returns the connection and the receiver for its write pump.
    pub async fn connect(
        &self,
        user_id: UserId,
        session_id: Option<SessionId>,
    ) -> Result<(Arc<Connection>, mpsc::Receiver<Outbound>), HubError> {
        let (connection, rx) = Connection::new(user_id, session_id, self.outbound_capacity);
        self.register(Arc::clone(&connection)).await?;
        Ok((connection, rx))
    }

    /// Register a connection.
    ///
    /// # Errors
    ///
    /// - `HubError::ShuttingDown` if the event loop has stopped
    pub async fn register(&self, connection: Arc<Connection>) -> Result<(), HubError> {
        self.submit(|respond_to| HubCommand::Register {
            connection,
            respond_to,
        })
        .await
    }

    /// Unregister a connection, closing its outbound queue.
    ///
    /// Returns `false` if the connection was not registered.
    ///
    /// # Errors
    ///
    /// - `HubError::ShuttingDown` if the event loop has stopped
    pub async fn unregister(&self, connection: Arc<Connection>) -> Result<bool, HubError> {
        self.submit(|respond_to| HubCommand::Unregister {
            connection,
            respond_to,
        })
        .await
    }

    /// Route a message to its session and/or user target.
    ///
    /// # Errors
    ///
    /// - `HubError::InvalidRequest` if neither target is set
    /// - `HubError::ShuttingDown` if the event loop has stopped
    pub async fn send(&self, request: RoutingRequest) -> Result<RouteOutcome, HubError> {
        let targets = request.validate()?;
        let message = request.message;
        self.submit(|respond_to| HubCommand::Send {
            targets,
            message,
            respond_to,
        })
        .await
    }

    /// Route a message to every connection.
    ///
    /// # Errors
    ///
    /// - `HubError::ShuttingDown` if the event loop has stopped
    pub async fn broadcast(&self, message: Message) -> Result<BroadcastOutcome, HubError> {
        self.submit(|respond_to| HubCommand::Broadcast {
            message,
            respond_to,
        })
        .await
    }

    /// Current registry statistics.
    ///
    /// This is a synchronous operation - it doesn't communicate with the actor.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns a standalone stats reader.
    pub fn stats_reader(&self) -> StatsReader {
        self.stats.clone()
    }

    /// Stop the event loop and close every registered connection's queue.
    ///
    /// Waits for the sweep to finish. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        self.stopped.cancelled().await;
    }

    /// Check if the event loop is still accepting events.
    pub fn is_running(&self) -> bool {
        !self.cancel_token.is_cancelled() && !self.sender.is_closed()
    }

    async fn submit<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T, HubError> {
        if self.cancel_token.is_cancelled() {
            return Err(HubError::ShuttingDown);
        }

        let (tx, rx) = oneshot::channel();

        self.sender
            .send(command(tx))
            .await
            .map_err(|_| HubError::ShuttingDown)?;

        rx.await.map_err(|_| HubError::ShuttingDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::registry::Registry;
    use std::sync::atomic::AtomicU64;

    fn create_test_handle() -> (HubHandle, mpsc::Receiver<HubCommand>, CancellationToken) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let registry = Registry::new();
        let stats = StatsReader::new(registry.shared_state(), Arc::new(AtomicU64::new(0)));
        let stopped = CancellationToken::new();
        let handle = HubHandle::new(cmd_tx, stats, CancellationToken::new(), stopped.clone(), 8);
        (handle, cmd_rx, stopped)
    }

    #[tokio::test]
    async fn test_send_rejects_missing_target() {
        let (handle, _rx, _) = create_test_handle();
        let request = RoutingRequest {
            target_user_id: None,
            target_session_id: Some(String::new()),
            message: Message::new("t", serde_json::Value::Null),
        };

        let result = handle.send(request).await;
        assert!(matches!(result, Err(HubError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_send_forwards_targets() {
        let (handle, mut rx, _) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(HubCommand::Send {
                targets,
                message,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(targets.user.map(|u| u.to_string()), Some("u1".to_string()));
                assert_eq!(message.kind, "greeting");
                let _ = respond_to.send(RouteOutcome {
                    delivered: 1,
                    dropped: 0,
                });
                return true;
            }
            false
        });

        let request = RoutingRequest::for_user("u1", Message::new("greeting", serde_json::Value::Null));
        let outcome = handle.send(request).await.unwrap();
        assert!(outcome.sent());
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_channel_closed_maps_to_shutting_down() {
        let (handle, rx, _) = create_test_handle();
        drop(rx);

        let result = handle.broadcast(Message::new("t", serde_json::Value::Null)).await;
        assert_eq!(result, Err(HubError::ShuttingDown));
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_dropped_reply_maps_to_shutting_down() {
        let (handle, mut rx, _) = create_test_handle();

        tokio::spawn(async move {
            // Receive and drop without replying
            let _ = rx.recv().await;
        });

        let (connection, _queue) = Connection::new(UserId::parse("u1").unwrap(), None, 1);
        let result = handle.unregister(connection).await;
        assert_eq!(result, Err(HubError::ShuttingDown));
    }

    #[tokio::test]
    async fn test_submissions_fail_after_shutdown() {
        let (handle, _rx, stopped) = create_test_handle();
        // No actor here; mark the sweep as already finished
        stopped.cancel();

        handle.shutdown().await;
        handle.shutdown().await;

        assert!(!handle.is_running());
        let result = handle.broadcast(Message::new("t", serde_json::Value::Null)).await;
        assert_eq!(result, Err(HubError::ShuttingDown));
    }
}
