//! Message routing over the registry.
//!
//! Every enqueue is non-blocking: a full outbound queue drops the message for
//! that connection only, so one stalled consumer never stalls the event loop
//! or any other consumer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use relay_protocol::{Message, ResolvedTargets};

use super::connection::{Connection, EnqueueOutcome, Outbound};
use super::registry::Registry;

/// Result of routing one addressed message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    /// Enqueues that succeeded across session and user resolution
    pub delivered: usize,
    /// Enqueues dropped because the target queue was full
    pub dropped: usize,
}

impl RouteOutcome {
    /// True iff at least one enqueue succeeded.
    pub fn sent(&self) -> bool {
        self.delivered > 0
    }
}

/// Result of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

/// Resolves routing requests into enqueues, applying drop-on-full.
#[derive(Debug, Default)]
pub struct Dispatcher {
    dropped: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counter of messages dropped on full queues.
    pub fn drop_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }

    /// Delivers to the session target first, then to every connection of the
    /// user target. Either lookup may miss without failing the other.
    pub fn route_to_target(
        &self,
        registry: &Registry,
        targets: &ResolvedTargets,
        message: Message,
    ) -> RouteOutcome {
        let message: Outbound = Arc::new(message);
        let state = registry.read();
        let mut outcome = RouteOutcome::default();

        if let Some(session_id) = &targets.session {
            match state.session(session_id) {
                Some(connection) => match self.enqueue(connection, &message) {
                    EnqueueOutcome::Delivered => {
                        outcome.delivered += 1;
                        info!(session_id = %session_id, "Message sent to session");
                    }
                    EnqueueOutcome::Full => {
                        outcome.dropped += 1;
                        warn!(session_id = %session_id, "Failed to send message to session (buffer full)");
                    }
                    EnqueueOutcome::Closed => {
                        debug!(session_id = %session_id, "Session connection is closing");
                    }
                },
                None => debug!(session_id = %session_id, "Session not found"),
            }
        }

        if let Some(user_id) = &targets.user {
            let mut matched = 0usize;
            for connection in state.user(user_id) {
                matched += 1;
                match self.enqueue(connection, &message) {
                    EnqueueOutcome::Delivered => outcome.delivered += 1,
                    EnqueueOutcome::Full => {
                        outcome.dropped += 1;
                        warn!(
                            user_id = %user_id,
                            connection = %connection.id(),
                            "Failed to send message to user (buffer full)"
                        );
                    }
                    EnqueueOutcome::Closed => {}
                }
            }

            if matched == 0 {
                debug!(user_id = %user_id, "User not found");
            } else {
                info!(user_id = %user_id, clients = matched, "Message sent to user");
            }
        }

        if !outcome.sent() {
            info!(
                dropped = outcome.dropped,
                "Message not sent: no valid target accepted it"
            );
        }

        outcome
    }

    /// Delivers to every registered connection.
    pub fn route_to_all(&self, registry: &Registry, message: Message) -> BroadcastOutcome {
        let message: Outbound = Arc::new(message);
        let state = registry.read();
        let mut outcome = BroadcastOutcome::default();

        for connection in state.connections() {
            match self.enqueue(connection, &message) {
                EnqueueOutcome::Delivered => outcome.delivered += 1,
                EnqueueOutcome::Full => {
                    outcome.dropped += 1;
                    warn!(
                        user_id = %connection.user_id(),
                        connection = %connection.id(),
                        "Failed to broadcast to client (buffer full)"
                    );
                }
                EnqueueOutcome::Closed => {}
            }
        }

        info!(
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            "Broadcast message sent"
        );
        outcome
    }

    fn enqueue(&self, connection: &Connection, message: &Outbound) -> EnqueueOutcome {
        let result = connection.try_enqueue(message);
        if result == EnqueueOutcome::Full {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{SessionId, UserId};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn register(
        registry: &mut Registry,
        user: &str,
        session: &str,
        capacity: usize,
    ) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
        let (connection, rx) = Connection::new(
            UserId::parse(user).unwrap(),
            SessionId::from_optional(Some(session)),
            capacity,
        );
        registry.insert(Arc::clone(&connection));
        (connection, rx)
    }

    fn targets(user: Option<&str>, session: Option<&str>) -> ResolvedTargets {
        ResolvedTargets {
            user: user.map(|u| UserId::parse(u).unwrap()),
            session: SessionId::from_optional(session),
        }
    }

    fn msg(kind: &str) -> Message {
        Message::new(kind, json!({}))
    }

    #[test]
    fn test_session_target_delivers() {
        let mut registry = Registry::new();
        let (_a, mut rx) = register(&mut registry, "u1", "s1", 4);
        let dispatcher = Dispatcher::new();

        let outcome = dispatcher.route_to_target(&registry, &targets(None, Some("s1")), msg("hello"));
        assert!(outcome.sent());
        assert_eq!(rx.try_recv().unwrap().kind, "hello");
    }

    #[test]
    fn test_unknown_user_sends_nothing() {
        let mut registry = Registry::new();
        let (_a, mut rx) = register(&mut registry, "u1", "s1", 4);
        let dispatcher = Dispatcher::new();

        let outcome = dispatcher.route_to_target(&registry, &targets(Some("ghost"), None), msg("x"));
        assert!(!outcome.sent());
        assert_eq!(outcome, RouteOutcome::default());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_user_fan_out_and_session_scope() {
        let mut registry = Registry::new();
        let (_a, mut rx_a) = register(&mut registry, "u1", "s1", 4);
        let (_b, mut rx_b) = register(&mut registry, "u1", "", 4);
        let dispatcher = Dispatcher::new();

        let outcome = dispatcher.route_to_target(&registry, &targets(Some("u1"), None), msg("m1"));
        assert_eq!(outcome.delivered, 2);
        assert_eq!(rx_a.try_recv().unwrap().kind, "m1");
        assert_eq!(rx_b.try_recv().unwrap().kind, "m1");

        let outcome = dispatcher.route_to_target(&registry, &targets(None, Some("s1")), msg("m2"));
        assert_eq!(outcome.delivered, 1);
        assert_eq!(rx_a.try_recv().unwrap().kind, "m2");
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_partial_success_when_session_queue_full() {
        let mut registry = Registry::new();
        let (_a, _rx_a) = register(&mut registry, "u1", "s1", 1);
        let (_b, mut rx_b) = register(&mut registry, "u2", "", 4);
        let dispatcher = Dispatcher::new();

        // Fill the session connection's queue
        dispatcher.route_to_target(&registry, &targets(None, Some("s1")), msg("fill"));

        let outcome =
            dispatcher.route_to_target(&registry, &targets(Some("u2"), Some("s1")), msg("m"));
        assert!(outcome.sent());
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(rx_b.try_recv().unwrap().kind, "m");
        assert_eq!(dispatcher.drop_counter().load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_all_dropped_reports_not_sent() {
        let mut registry = Registry::new();
        let (_a, _rx) = register(&mut registry, "u1", "s1", 1);
        let dispatcher = Dispatcher::new();

        dispatcher.route_to_target(&registry, &targets(Some("u1"), None), msg("fill"));
        let outcome = dispatcher.route_to_target(&registry, &targets(Some("u1"), None), msg("m"));
        assert!(!outcome.sent());
        assert_eq!(outcome.dropped, 1);
    }

    #[test]
    fn test_session_and_user_on_same_connection_enqueue_twice() {
        let mut registry = Registry::new();
        let (_a, mut rx) = register(&mut registry, "u1", "s1", 4);
        let dispatcher = Dispatcher::new();

        let outcome =
            dispatcher.route_to_target(&registry, &targets(Some("u1"), Some("s1")), msg("m"));
        assert_eq!(outcome.delivered, 2);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_counts_full_queues() {
        let mut registry = Registry::new();
        let mut receivers = Vec::new();
        for i in 0..5 {
            let (_c, rx) = register(&mut registry, &format!("u{i}"), "", 1);
            receivers.push(rx);
        }
        let dispatcher = Dispatcher::new();

        // Fill two queues
        dispatcher.route_to_target(&registry, &targets(Some("u0"), None), msg("fill"));
        dispatcher.route_to_target(&registry, &targets(Some("u3"), None), msg("fill"));

        let outcome = dispatcher.route_to_all(&registry, msg("all"));
        assert_eq!(outcome.delivered, 3);
        assert_eq!(outcome.dropped, 2);
    }

    #[test]
    fn test_broadcast_on_empty_registry() {
        let registry = Registry::new();
        let outcome = Dispatcher::new().route_to_all(&registry, msg("nobody"));
        assert_eq!(outcome, BroadcastOutcome::default());
    }
}
