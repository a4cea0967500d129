//! Relay Core - Shared identity types for the relay hub
//!
//! This crate provides the identity newtypes shared between the
//! wire protocol (relay-protocol) and the daemon (relayd).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod identity;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use identity::{ConnectionId, SessionId, UserId};
