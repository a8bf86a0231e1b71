//! Infrastructure layer for deskrelay-server.
//!
//! The infrastructure layer handles all I/O for the broker's connections.
//!
//! # Responsibilities
//!
//! - Binding a TCP listener and performing the WebSocket upgrade
//! - Spawning per-connection reader and writer tasks
//! - Queuing broker deliveries to their addressees
//! - Pinging connections and closing the silent ones
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Event handling (that is `deskrelay-broker`)
//! - Wire types (that is `deskrelay-core`)
//! - Configuration parsing (that is done in `main.rs`)

pub mod hub;
pub mod ws_server;

pub use hub::ConnectionHub;
pub use ws_server::{run_server, serve};
