//! # deskrelay-core
//!
//! Shared library for DeskRelay containing connection identifiers, pairing
//! codes, password digests, and the JSON signaling catalogue exchanged between
//! hosts, controllers, and the broker.
//!
//! This crate is used by both the broker library and the server binary.
//! It has zero dependencies on sockets, async runtimes, or the file system.
//!
//! # Architecture overview (for beginners)
//!
//! DeskRelay is a rendezvous broker for remote desktop sessions.  A **host**
//! (the machine being controlled) announces itself and receives a six digit
//! pairing code.  A **controller** (the client) types that code, the host
//! approves, and from then on the broker forwards opaque handshake and input
//! messages between the two until the peer-to-peer media path takes over.
//!
//! This crate (`deskrelay-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – Identifiers with no behaviour beyond validation:
//!   [`ConnectionId`] (assigned by the transport) and [`PairingCode`].
//!
//! - **`protocol`** – How events travel over the wire.  Every frame is a JSON
//!   object `{"event": "...", "data": {...}}`; the codec turns text frames into
//!   typed [`InboundEvent`] values and typed [`OutboundEvent`] values back into
//!   text frames.
//!
//! - **`crypto`** – One-way salted digests for access passwords.  Plaintext
//!   passwords never leave the request that carried them.

pub mod crypto;
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `deskrelay_core::ConnectionId` instead of the full module path.
pub use domain::code::{CodeError, PairingCode};
pub use domain::ids::ConnectionId;
pub use protocol::codec::{decode_inbound, encode_outbound, ProtocolError};
pub use protocol::messages::{InboundEvent, OutboundEvent, RelayKind};
