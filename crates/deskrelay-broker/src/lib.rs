//! deskrelay-broker library entry point.
//!
//! The rendezvous and signaling broker for remote-desktop sessions: hosts
//! announce themselves and receive a pairing code, clients pair by code or by
//! stored credential, and the broker relays the peer-to-peer negotiation
//! between them.  The transport lives in `deskrelay-server`; this crate never
//! opens a socket.
//!
//! Re-exports the public modules so that integration tests in `tests/` and
//! the server binary share the same module tree.

pub mod application;
pub mod infrastructure;

pub use application::broker::{Broker, BrokerStats, Delivery};
pub use application::delivery::{deliver_all, DeliveryError, Outbound};
pub use application::error::BrokerError;
pub use application::persistence::Durability;
pub use infrastructure::bootstrap::build_broker;
pub use infrastructure::storage::config::{load_config, BrokerConfig, ConfigError};
