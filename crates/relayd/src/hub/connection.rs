//! Live connection handle.
//!
//! A `Connection` is shared (`Arc`) between the registry indices, the
//! dispatcher, and the per-connection pumps. It owns the only sender of its
//! bounded outbound queue; the write pump owns the receiver and treats
//! `recv() == None` as its termination signal.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Enqueue never awaits; a full queue is reported, not retried

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use relay_core::{ConnectionId, SessionId, UserId};
use relay_protocol::Message;

/// Item type carried by outbound queues.
///
/// Fan-out shares one allocation across every target.
pub type Outbound = Arc<Message>;

const ACTIVE: u8 = 0;
const DEREGISTERING: u8 = 1;
const CLOSED: u8 = 2;

/// Liveness of a connection.
///
/// Transitions are strictly `Active -> Deregistering -> Closed`.
/// `Deregistering` is transient: it is held only while `close()` takes the
/// sender, and marks that a close is already in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Active,
    Deregistering,
    Closed,
}

/// Result of a non-blocking enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The message is in the outbound queue.
    Delivered,
    /// The queue was at capacity; the message was dropped.
    Full,
    /// The queue is closed (connection closing or write pump gone).
    Closed,
}

/// One live client connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    session_id: Option<SessionId>,
    outbound: Mutex<Option<mpsc::Sender<Outbound>>>,
    liveness: AtomicU8,
}

impl Connection {
    /// Creates a connection with a bounded outbound queue.
    ///
    /// Returns the shared connection and the queue receiver for the write pump.
    /// A capacity of zero is raised to one.
    pub fn new(
        user_id: UserId,
        session_id: Option<SessionId>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: ConnectionId::next(),
            user_id,
            session_id,
            outbound: Mutex::new(Some(tx)),
            liveness: AtomicU8::new(ACTIVE),
        };
        (Arc::new(connection), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Current liveness state.
    pub fn liveness(&self) -> Liveness {
        match self.liveness.load(Ordering::Acquire) {
            ACTIVE => Liveness::Active,
            DEREGISTERING => Liveness::Deregistering,
            _ => Liveness::Closed,
        }
    }

    /// Attempts to enqueue without waiting.
    pub fn try_enqueue(&self, message: &Outbound) -> EnqueueOutcome {
        let outbound = self.outbound.lock();
        let Some(sender) = outbound.as_ref() else {
            return EnqueueOutcome::Closed;
        };

        match sender.try_send(Arc::clone(message)) {
            Ok(()) => EnqueueOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => EnqueueOutcome::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }

    /// Closes the outbound queue.
    ///
    /// Only the first call performs the close and returns `true`; every later
    /// call (racing unregister, shutdown sweep) is a no-op returning `false`.
    pub fn close(&self) -> bool {
        if self
            .liveness
            .compare_exchange(ACTIVE, DEREGISTERING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // Dropping the only sender ends the write pump's recv loop.
        drop(self.outbound.lock().take());
        self.liveness.store(CLOSED, Ordering::Release);
        true
    }
}
