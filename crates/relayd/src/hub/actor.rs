//! Hub actor - the single mutator of registry state.
//!
//! The actor receives [`HubCommand`]s over an mpsc channel and applies them
//! one at a time, in arrival order. Shutdown is observed through a
//! `CancellationToken`; once cancelled the loop starts no further command,
//! closes its intake, sweeps the registry, and signals completion.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Reply send failures are ignored (the caller may have gone away)

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::commands::HubCommand;
use super::dispatcher::Dispatcher;
use super::registry::Registry;

/// The hub event loop.
///
/// # Ownership
///
/// The actor owns the `Registry` (write side) and the `Dispatcher`. All
/// registry mutation happens inside [`HubActor::run`].
pub struct HubActor {
    /// Command receiver
    receiver: mpsc::Receiver<HubCommand>,

    /// Identity indices
    registry: Registry,

    /// Routing logic
    dispatcher: Dispatcher,

    /// Cancelled to request shutdown
    cancel_token: CancellationToken,

    /// Cancelled by the actor once the shutdown sweep has finished
    stopped: CancellationToken,
}

impl HubActor {
    pub fn new(
        receiver: mpsc::Receiver<HubCommand>,
        registry: Registry,
        dispatcher: Dispatcher,
        cancel_token: CancellationToken,
        stopped: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            registry,
            dispatcher,
            cancel_token,
            stopped,
        }
    }

    /// Runs the event loop until shutdown is requested or every handle is dropped.
    pub async fn run(mut self) {
        info!("Hub event loop starting");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    info!("Hub shutting down");
                    break;
                }

                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!("All hub handles dropped");
                        break;
                    }
                },
            }
        }

        // Queued but unapplied commands are dropped with the receiver; their
        // callers observe a closed reply channel.
        self.receiver.close();
        let closed = self.registry.shutdown();

        info!(closed_connections = closed, "Hub event loop stopped");
        self.stopped.cancel();
    }

    /// Applies one command.
    fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register {
                connection,
                respond_to,
            } => {
                self.registry.insert(connection);
                let _ = respond_to.send(());
            }
            HubCommand::Unregister {
                connection,
                respond_to,
            } => {
                let removed = self.registry.remove(&connection);
                let _ = respond_to.send(removed);
            }
            HubCommand::Send {
                targets,
                message,
                respond_to,
            } => {
                let outcome = self
                    .dispatcher
                    .route_to_target(&self.registry, &targets, message);
                let _ = respond_to.send(outcome);
            }
            HubCommand::Broadcast {
                message,
                respond_to,
            } => {
                let outcome = self.dispatcher.route_to_all(&self.registry, message);
                let _ = respond_to.send(outcome);
            }
        }
    }
}
