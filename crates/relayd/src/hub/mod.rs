//! Connection hub using the Actor pattern.
//!
//! The hub is the single authority over which connections are live and which
//! of them receive each routed message.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ WebSocket / API │────▶│    HubActor     │────▶│ Connection queues│
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                       │
//!         │   HubCommand          │   Registry +          │  try_send,
//!         │   (mpsc + oneshot)    │   Dispatcher          │  drop on full
//!         ▼                       ▼                       ▼
//!    register/unregister     by_user / by_session     write pumps
//!    send/broadcast          (one RwLock)
//!         │
//!         └──── StatsReader (read lock, bypasses the loop)
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - Routing failures are counts, never errors
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod actor;
mod commands;
mod connection;
mod dispatcher;
mod handle;
mod registry;
mod stats;

pub use actor::HubActor;
pub use commands::{HubCommand, HubError};
pub use connection::{Connection, EnqueueOutcome, Liveness, Outbound};
pub use dispatcher::{BroadcastOutcome, Dispatcher, RouteOutcome};
pub use handle::HubHandle;
pub use registry::{Registry, RegistrySnapshot};
pub use stats::StatsReader;

/// Default event intake capacity: a near-synchronous handoff.
pub const DEFAULT_EVENT_CAPACITY: usize = 1;

/// Default per-connection outbound queue capacity.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Hub tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of the event intake channel
    pub event_capacity: usize,
    /// Capacity of each connection's outbound queue
    pub outbound_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

/// Spawn the hub actor and return a handle for interaction.
///
/// Must be called from within a tokio runtime.
///
/// # Example
///
/// ```no_run
/// use relayd::hub::{spawn_hub, HubConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let hub = spawn_hub(HubConfig::default());
///     println!("{:?}", hub.stats());
///     hub.shutdown().await;
/// }
/// ```
pub fn spawn_hub(config: HubConfig) -> HubHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.event_capacity.max(1));
    let cancel_token = CancellationToken::new();
    let stopped = CancellationToken::new();

    let registry = Registry::new();
    let dispatcher = Dispatcher::new();
    let stats = StatsReader::new(registry.shared_state(), dispatcher.drop_counter());

    let actor = HubActor::new(
        cmd_rx,
        registry,
        dispatcher,
        cancel_token.clone(),
        stopped.clone(),
    );
    tokio::spawn(actor.run());

    HubHandle::new(
        cmd_tx,
        stats,
        cancel_token,
        stopped,
        config.outbound_capacity,
    )
}
