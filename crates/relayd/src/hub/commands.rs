//! Hub event loop commands and errors.
//!
//! Every command carries a oneshot reply so the submitting caller suspends
//! until the loop has applied its event.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;

use relay_protocol::{Message, ProtocolError, ResolvedTargets};

use super::connection::Connection;
use super::dispatcher::{BroadcastOutcome, RouteOutcome};

// ============================================================================
// Hub Commands
// ============================================================================

/// Events consumed by the hub event loop, applied strictly in arrival order.
#[derive(Debug)]
pub enum HubCommand {
    /// Index a newly accepted connection.
    Register {
        connection: Arc<Connection>,
        respond_to: oneshot::Sender<()>,
    },

    /// Remove a connection and close its outbound queue.
    ///
    /// Replies `false` when the connection was not registered.
    Unregister {
        connection: Arc<Connection>,
        respond_to: oneshot::Sender<bool>,
    },

    /// Deliver a message to a session and/or user target.
    Send {
        targets: ResolvedTargets,
        message: Message,
        respond_to: oneshot::Sender<RouteOutcome>,
    },

    /// Deliver a message to every connection.
    Broadcast {
        message: Message,
        respond_to: oneshot::Sender<BroadcastOutcome>,
    },
}

// ============================================================================
// Hub Errors
// ============================================================================

/// Errors returned by [`HubHandle`](super::HubHandle) submissions.
///
/// Routing itself never fails; these only describe why an event could not
/// be submitted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HubError {
    /// The event loop has stopped or is stopping.
    #[error("hub is shutting down")]
    ShuttingDown,

    /// The routing request was rejected before submission.
    #[error(transparent)]
    InvalidRequest(#[from] ProtocolError),
}
