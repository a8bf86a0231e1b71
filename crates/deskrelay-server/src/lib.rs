//! deskrelay-server library crate.
//!
//! The WebSocket front end of the DeskRelay broker.  It owns the sockets and
//! nothing else: every decoded event is handed to `deskrelay-broker`, and the
//! deliveries it returns are queued to their addressees.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser / host agent (JSON over WebSocket)
//!         ↕
//! [deskrelay-server]
//!   ├── domain/           ServerConfig
//!   ├── application/      Text frame → broker → deliveries
//!   └── infrastructure/
//!         ├── ws_server/  Accept loop, per-connection reader and writer
//!         └── hub/        One outbound queue per live connection
//!         ↕
//! [deskrelay-broker]      Sessions, pairing, credentials, relay
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain`, `deskrelay-core` and
//!   `deskrelay-broker` only.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tungstenite`.

/// Domain layer: transport configuration.
pub mod domain;

/// Application layer: frame decoding and dispatch.
pub mod application;

/// Infrastructure layer: WebSocket server and connection hub.
pub mod infrastructure;
