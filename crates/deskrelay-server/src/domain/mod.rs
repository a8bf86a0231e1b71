//! Domain layer for deskrelay-server.
//!
//! The event catalogue itself lives in `deskrelay-core`; the only type this
//! crate adds is the transport configuration.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;

pub use config::ServerConfig;
