//! Relay Daemon - Connection hub and WebSocket server
//!
//! This crate provides the core infrastructure for the relay:
//! - `hub` - Connection registry, dispatcher and the event loop that owns them
//! - `server` - Axum server: WebSocket transport, admin API, health
//! - `config` - Runtime configuration from flags and environment
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         relayd                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   RelayServer   │────▶│         HubActor            │   │
//! │  │ (axum: /ws,/api)│     │  (registry + dispatcher)    │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ upgrades                    │ try_send          │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ read/write pumps│◀────│   per-connection queues     │   │
//! │  │  (per client)   │     │   (bounded mpsc)            │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod hub;
pub mod server;
