//! Relay Protocol - Wire types for the relay hub
//!
//! This crate provides the message types exchanged with WebSocket clients
//! and the request/response bodies of the administrative HTTP API.

pub mod api;
pub mod error;
pub mod message;

pub use api::{BroadcastResponse, ErrorResponse, HealthResponse, SendResponse, StatsSnapshot};
pub use error::ProtocolError;
pub use message::{Message, ResolvedTargets, RoutingRequest};
