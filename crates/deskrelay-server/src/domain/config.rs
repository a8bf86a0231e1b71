//! Transport configuration.
//!
//! [`ServerConfig`] holds the settings the WebSocket layer needs at run time.
//! It is derived once at start-up from the `[server]` section of the broker's
//! TOML file (after CLI overrides) and then shared read-only by every
//! connection task.

use std::net::SocketAddr;
use std::time::Duration;

use deskrelay_broker::infrastructure::storage::config::{ConfigError, ServerSection};

/// All runtime settings of the WebSocket listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Where the listener binds.
    pub listen_addr: SocketAddr,

    /// How often the server pings each connection.
    pub ping_interval: Duration,

    /// A connection that sends nothing (pongs included) for this long is
    /// closed with reason `ping timeout`.
    pub ping_timeout: Duration,

    /// Largest accepted message, in bytes.
    pub max_message_size: usize,

    /// Per-connection outbound queue length.  A full queue drops the event.
    pub outbound_capacity: usize,
}

impl ServerConfig {
    /// Builds the transport settings from the `[server]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] when the bind address and port
    /// do not form a socket address.
    pub fn from_section(section: &ServerSection) -> Result<Self, ConfigError> {
        Ok(Self {
            listen_addr: section.listen_addr()?,
            ping_interval: section.ping_interval(),
            ping_timeout: section.ping_timeout(),
            max_message_size: section.max_message_size,
            outbound_capacity: section.outbound_capacity.max(1),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
