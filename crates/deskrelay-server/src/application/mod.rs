//! Application layer for deskrelay-server.
//!
//! Turns decoded frames into broker calls and broker deliveries back into
//! frames.  It knows *what* to send, but delegates *how* to the
//! infrastructure layer.
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - Tokio task spawning (that happens in the infrastructure layer)
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod session_service;

pub use session_service::{encode_frame, process_text_frame};
