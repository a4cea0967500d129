//! Read-only view of registry size.
//!
//! Callable from any task concurrently with the event loop; every snapshot
//! is taken under the registry's read lock, so counts are never torn.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use relay_protocol::StatsSnapshot;

use super::registry::SharedState;

/// Cheap-to-clone reader of hub statistics.
#[derive(Debug, Clone)]
pub struct StatsReader {
    state: SharedState,
    dropped: Arc<AtomicU64>,
}

impl StatsReader {
    pub(crate) fn new(state: SharedState, dropped: Arc<AtomicU64>) -> Self {
        Self { state, dropped }
    }

    /// Current counts of users, connections, sessions and dropped messages.
    pub fn snapshot(&self) -> StatsSnapshot {
        let registry = self.state.read().snapshot();
        StatsSnapshot {
            total_users: registry.user_count,
            total_connections: registry.connection_count,
            total_sessions: registry.session_count,
            messages_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
