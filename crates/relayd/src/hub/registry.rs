//! Connection registry - identity indices over live connections.
//!
//! The two indices form one logical unit behind a single reader/writer lock.
//! Only the hub event loop holds a `Registry` and mutates it; readers such as
//! [`StatsReader`](super::StatsReader) share the lock in read mode.
//!
//! Invariants:
//! - a `by_user` key exists iff its connection set is non-empty
//! - every `by_session` entry points at a connection present in `by_user`

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

use relay_core::{ConnectionId, SessionId, UserId};

use super::connection::Connection;

/// Counts of indexed identities at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub user_count: usize,
    pub connection_count: usize,
    pub session_count: usize,
}

/// Lock-protected index state.
#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    by_user: HashMap<UserId, HashMap<ConnectionId, Arc<Connection>>>,
    by_session: HashMap<SessionId, Arc<Connection>>,
}

impl RegistryState {
    pub(crate) fn session(&self, session_id: &SessionId) -> Option<&Arc<Connection>> {
        self.by_session.get(session_id)
    }

    pub(crate) fn user(&self, user_id: &UserId) -> impl Iterator<Item = &Arc<Connection>> {
        self.by_user
            .get(user_id)
            .into_iter()
            .flat_map(|set| set.values())
    }

    pub(crate) fn connections(&self) -> impl Iterator<Item = &Arc<Connection>> {
        self.by_user.values().flat_map(|set| set.values())
    }

    pub(crate) fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            user_count: self.by_user.len(),
            connection_count: self.by_user.values().map(HashMap::len).sum(),
            session_count: self.by_session.len(),
        }
    }
}

/// Shared handle to the index state, used by readers.
pub(crate) type SharedState = Arc<RwLock<RegistryState>>;

/// In-memory index of live connections by identity.
#[derive(Debug, Default)]
pub struct Registry {
    state: SharedState,
    /// Set by `shutdown`; later inserts are closed instead of indexed
    shut: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn shared_state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Acquires the lock in shared mode for a consistent traversal.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read()
    }

    /// Indexes a connection under its user and, if present, its session.
    ///
    /// A reused session id silently moves to the newer connection; the older
    /// connection stays reachable through its user until removed.
    pub fn insert(&mut self, connection: Arc<Connection>) {
        if self.shut {
            connection.close();
            debug!(connection = %connection.id(), "Registry shut down, connection closed");
            return;
        }

        let mut state = self.state.write();

        if let Some(session_id) = connection.session_id() {
            if let Some(previous) = state
                .by_session
                .insert(session_id.clone(), Arc::clone(&connection))
            {
                debug!(
                    session_id = %session_id,
                    previous = %previous.id(),
                    current = %connection.id(),
                    "Session id superseded"
                );
            }
        }

        state
            .by_user
            .entry(connection.user_id().clone())
            .or_default()
            .insert(connection.id(), Arc::clone(&connection));

        info!(
            connection = %connection.id(),
            user_id = %connection.user_id(),
            session_id = ?connection.session_id().map(SessionId::as_str),
            total_users = state.by_user.len(),
            "Client registered"
        );
    }

    /// Removes a connection and closes its outbound queue.
    ///
    /// Removing an absent connection is a no-op. Returns whether the
    /// connection was indexed.
    pub fn remove(&mut self, connection: &Connection) -> bool {
        let mut state = self.state.write();
        let user_id = connection.user_id();

        let removed = match state.by_user.get_mut(user_id) {
            Some(set) => {
                let removed = set.remove(&connection.id()).is_some();
                if set.is_empty() {
                    state.by_user.remove(user_id);
                }
                removed
            }
            None => false,
        };

        if let Some(session_id) = connection.session_id() {
            let owned = state
                .by_session
                .get(session_id)
                .is_some_and(|current| current.id() == connection.id());
            if owned {
                state.by_session.remove(session_id);
            }
        }

        let total_users = state.by_user.len();
        drop(state);

        if removed {
            connection.close();
            info!(
                connection = %connection.id(),
                user_id = %user_id,
                session_id = ?connection.session_id().map(SessionId::as_str),
                total_users,
                "Client unregistered"
            );
        } else {
            debug!(connection = %connection.id(), "Unregister for unknown connection ignored");
        }

        removed
    }

    /// Point lookup by session id.
    pub fn lookup_by_session(&self, session_id: &SessionId) -> Option<Arc<Connection>> {
        self.state.read().session(session_id).cloned()
    }

    /// All connections registered under a user.
    pub fn lookup_by_user(&self, user_id: &UserId) -> Vec<Arc<Connection>> {
        self.state.read().user(user_id).cloned().collect()
    }

    /// Consistent counts of users, connections and sessions.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.state.read().snapshot()
    }

    /// Empties both indices and closes every drained connection.
    ///
    /// Connections already closed by an earlier unregister are skipped by
    /// their one-shot gate. Returns how many queues this call closed.
    pub fn shutdown(&mut self) -> usize {
        self.shut = true;
        let drained: Vec<Arc<Connection>> = {
            let mut state = self.state.write();
            state.by_session.clear();
            state
                .by_user
                .drain()
                .flat_map(|(_, set)| set.into_values())
                .collect()
        };

        drained.iter().filter(|connection| connection.close()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::connection::{Liveness, Outbound};
    use tokio::sync::mpsc;

    fn conn(user: &str, session: &str) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
        Connection::new(
            UserId::parse(user).unwrap(),
            SessionId::from_optional(Some(session)),
            8,
        )
    }

    fn assert_invariants(registry: &Registry) {
        let state = registry.read();
        for set in state.by_user.values() {
            assert!(!set.is_empty(), "empty user set left in index");
        }
        for connection in state.by_session.values() {
            let indexed = state
                .by_user
                .get(connection.user_id())
                .is_some_and(|set| set.contains_key(&connection.id()));
            assert!(indexed, "session entry points at unregistered connection");
        }
    }

    #[test]
    fn test_insert_indexes_user_and_session() {
        let mut registry = Registry::new();
        let (a, _rx) = conn("u1", "s1");
        registry.insert(Arc::clone(&a));

        assert_eq!(registry.lookup_by_user(a.user_id()).len(), 1);
        assert_eq!(
            registry.lookup_by_session(&SessionId::new("s1")).map(|c| c.id()),
            Some(a.id())
        );
        assert_eq!(
            registry.snapshot(),
            RegistrySnapshot {
                user_count: 1,
                connection_count: 1,
                session_count: 1
            }
        );
    }

    #[test]
    fn test_empty_session_is_not_indexed() {
        let mut registry = Registry::new();
        let (a, _rx) = conn("u1", "");
        registry.insert(a);

        assert_eq!(registry.snapshot().session_count, 0);
        assert_eq!(registry.snapshot().connection_count, 1);
    }

    #[test]
    fn test_remove_deletes_empty_user_entry() {
        let mut registry = Registry::new();
        let (a, _rx_a) = conn("u1", "s1");
        let (b, _rx_b) = conn("u1", "");
        registry.insert(Arc::clone(&a));
        registry.insert(Arc::clone(&b));

        assert!(registry.remove(&a));
        assert_eq!(registry.lookup_by_user(b.user_id()).len(), 1);
        assert!(registry.lookup_by_session(&SessionId::new("s1")).is_none());
        assert_invariants(&registry);

        assert!(registry.remove(&b));
        assert_eq!(registry.snapshot(), RegistrySnapshot::default());
        assert_invariants(&registry);
    }

    #[tokio::test]
    async fn test_remove_closes_queue() {
        let mut registry = Registry::new();
        let (a, mut rx) = conn("u1", "s1");
        registry.insert(Arc::clone(&a));

        registry.remove(&a);
        assert_eq!(a.liveness(), Liveness::Closed);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = Registry::new();
        let (a, _rx) = conn("u1", "s1");
        registry.insert(Arc::clone(&a));

        assert!(registry.remove(&a));
        assert!(!registry.remove(&a));
        assert_eq!(registry.snapshot(), RegistrySnapshot::default());
    }

    #[test]
    fn test_reused_session_supersedes_index_only() {
        let mut registry = Registry::new();
        let (a, _rx_a) = conn("u1", "shared");
        let (b, _rx_b) = conn("u2", "shared");
        registry.insert(Arc::clone(&a));
        registry.insert(Arc::clone(&b));

        let session = SessionId::new("shared");
        assert_eq!(registry.lookup_by_session(&session).map(|c| c.id()), Some(b.id()));
        assert_eq!(registry.lookup_by_user(a.user_id()).len(), 1);
        assert_eq!(registry.lookup_by_user(b.user_id()).len(), 1);

        // Removing the superseded connection must not evict the newer mapping
        registry.remove(&a);
        assert_eq!(registry.lookup_by_session(&session).map(|c| c.id()), Some(b.id()));
        assert_invariants(&registry);

        registry.remove(&b);
        assert!(registry.lookup_by_session(&session).is_none());
        assert_invariants(&registry);
    }

    #[test]
    fn test_shutdown_closes_each_queue_once() {
        let mut registry = Registry::new();
        let (a, _rx_a) = conn("u1", "s1");
        let (b, _rx_b) = conn("u1", "");
        let (c, _rx_c) = conn("u2", "s2");
        for connection in [&a, &b, &c] {
            registry.insert(Arc::clone(connection));
        }

        // Unregistered before the sweep: must not be closed again
        registry.remove(&c);

        assert_eq!(registry.shutdown(), 2);
        assert_eq!(registry.shutdown(), 0);
        assert_eq!(registry.snapshot(), RegistrySnapshot::default());
        for connection in [&a, &b, &c] {
            assert_eq!(connection.liveness(), Liveness::Closed);
            assert!(!connection.close());
        }
    }

    #[test]
    fn test_insert_after_shutdown_closes_instead() {
        let mut registry = Registry::new();
        registry.shutdown();

        let (late, _rx) = conn("u1", "s1");
        registry.insert(Arc::clone(&late));

        assert_eq!(late.liveness(), Liveness::Closed);
        assert_eq!(registry.snapshot(), RegistrySnapshot::default());
    }

    #[test]
    fn test_invariants_hold_over_mixed_sequence() {
        let mut registry = Registry::new();
        let mut live = Vec::new();

        for i in 0..40 {
            let user = format!("u{}", i % 5);
            let session = if i % 3 == 0 { format!("s{}", i % 4) } else { String::new() };
            let (c, rx) = conn(&user, &session);
            registry.insert(Arc::clone(&c));
            live.push((c, rx));

            if i % 4 == 1 {
                let (victim, _) = live.remove(i % live.len());
                registry.remove(&victim);
            }
            assert_invariants(&registry);
        }

        assert_eq!(registry.snapshot().connection_count, live.len());
    }
}
