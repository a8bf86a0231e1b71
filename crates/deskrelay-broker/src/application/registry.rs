//! Connection registry: the authoritative table of live connections.
//!
//! The registry answers three questions for every other component:
//!
//! - is connection X still connected?
//! - is X a host?
//! - which host, if any, is X paired with?
//!
//! # Connection lifecycle (for beginners)
//!
//! ```text
//!                ┌──► Host ─────────────────────────────┐
//! Connected ─────┤                                      ├──► (unregistered)
//!                └──► ClientPending ──► ClientPaired ───┘
//!                          ▲                 │
//!                          └── reaped / evicted
//! ```
//!
//! - `Connected`: transport open, no role declared yet.
//! - `Host`: sent `host-ready`; owns a session in the session code broker.
//! - `ClientPending`: asked to pair with a host and is waiting for approval.
//! - `ClientPaired`: holds a [`ClientToHostMapping`].
//!
//! The mapping lives *inside* the `ClientPaired` state, so "is a host" and
//! "has a mapping" cannot both be true for one connection id.
//!
//! # Mappings vs. links
//!
//! Pairing records two things.  The **mapping** is what the reaper ages out
//! after an hour.  The **link** is the approved client/host pair that relay
//! checks; it outlives the mapping and is removed only when the client is
//! evicted, re-pairs, becomes a host, or either side disconnects.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use deskrelay_core::ConnectionId;

/// How a client came to be paired with its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingMethod {
    /// The host approved a `connect-with-code` request.
    Code,
    /// `connect-with-password` matched a legacy trust entry.
    LegacyPassword,
    /// `connect-with-permanent-access` matched a stored credential.
    PermanentAccess,
}

/// The live association of a client with its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientToHostMapping {
    pub host_id: ConnectionId,
    /// Creation time.  Re-pairing replaces the whole mapping.
    pub established_at: Instant,
    pub via: PairingMethod,
}

/// Role of a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Host,
    ClientPending { host_id: ConnectionId },
    ClientPaired(ClientToHostMapping),
}

/// One live connection.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub id: ConnectionId,
    pub connected_at: Instant,
    pub state: ConnectionState,
}

/// In-memory table of live connections.
///
/// Stored behind a `tokio::sync::Mutex` in [`crate::application::broker::Broker`]
/// so every connection task can consult and update it.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    /// Approved client → host links.
    links: HashMap<ConnectionId, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a freshly accepted connection in the `Connected` state.
    ///
    /// Connection ids are never reused, so registering an existing id only
    /// happens on a programming error; the existing entry is left untouched.
    pub fn register(&mut self, id: ConnectionId, now: Instant) {
        self.connections.entry(id).or_insert(ConnectionEntry {
            id,
            connected_at: now,
            state: ConnectionState::Connected,
        });
    }

    /// Removes a connection and returns its last entry.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        self.links.remove(&id);
        self.links.retain(|_, host| *host != id);
        self.connections.remove(&id)
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(&id)
    }

    pub fn state(&self, id: ConnectionId) -> Option<&ConnectionState> {
        self.connections.get(&id).map(|entry| &entry.state)
    }

    pub fn is_host(&self, id: ConnectionId) -> bool {
        matches!(self.state(id), Some(ConnectionState::Host))
    }

    /// Marks `id` as a host.  Returns `false` when `id` is not registered.
    pub fn mark_host(&mut self, id: ConnectionId) -> bool {
        self.links.remove(&id);
        self.set_state(id, ConnectionState::Host)
    }

    /// Marks `id` as waiting for `host_id`'s approval.  A connection that is
    /// already paired keeps its mapping until the new request is resolved.
    pub fn mark_pending(&mut self, id: ConnectionId, host_id: ConnectionId) -> bool {
        match self.connections.get_mut(&id) {
            Some(entry) if !matches!(entry.state, ConnectionState::ClientPaired(_)) => {
                entry.state = ConnectionState::ClientPending { host_id };
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Returns a connection to the `Connected` state, dropping any mapping.
    pub fn reset(&mut self, id: ConnectionId) -> bool {
        self.set_state(id, ConnectionState::Connected)
    }

    /// Pairs `client` with `host`, replacing any previous mapping and link.
    ///
    /// Returns the replaced mapping, or `None` when there was none (or the
    /// client is not registered, in which case nothing is stored).
    pub fn pair(
        &mut self,
        client: ConnectionId,
        host_id: ConnectionId,
        via: PairingMethod,
        now: Instant,
    ) -> Option<ClientToHostMapping> {
        let entry = self.connections.get_mut(&client)?;
        self.links.insert(client, host_id);
        let mapping = ClientToHostMapping {
            host_id,
            established_at: now,
            via,
        };
        match std::mem::replace(&mut entry.state, ConnectionState::ClientPaired(mapping)) {
            ConnectionState::ClientPaired(previous) => Some(previous),
            _ => None,
        }
    }

    /// Removes `client`'s link and mapping, returning the mapping.
    pub fn unpair(&mut self, client: ConnectionId) -> Option<ClientToHostMapping> {
        self.links.remove(&client);
        let entry = self.connections.get_mut(&client)?;
        if !matches!(entry.state, ConnectionState::ClientPaired(_)) {
            return None;
        }
        match std::mem::replace(&mut entry.state, ConnectionState::Connected) {
            ConnectionState::ClientPaired(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn mapping(&self, client: ConnectionId) -> Option<&ClientToHostMapping> {
        match self.state(client) {
            Some(ConnectionState::ClientPaired(mapping)) => Some(mapping),
            _ => None,
        }
    }

    /// Removes every mapping and link that points at `host_id` and returns
    /// the clients that still held a mapping.
    pub fn take_clients_of(&mut self, host_id: ConnectionId) -> Vec<(ConnectionId, ClientToHostMapping)> {
        self.links.retain(|_, host| *host != host_id);
        let mut taken = Vec::new();
        for entry in self.connections.values_mut() {
            let points_at_host = matches!(
                &entry.state,
                ConnectionState::ClientPaired(m) if m.host_id == host_id
            );
            if points_at_host {
                if let ConnectionState::ClientPaired(mapping) =
                    std::mem::replace(&mut entry.state, ConnectionState::Connected)
                {
                    taken.push((entry.id, mapping));
                }
            }
        }
        taken
    }

    /// The host `client` was approved for, whether or not its mapping has
    /// been reaped.
    pub fn linked_host(&self, client: ConnectionId) -> Option<ConnectionId> {
        self.links.get(&client).copied()
    }

    /// Whether `a` and `b` are an approved client/host pair, in either order.
    pub fn are_linked(&self, a: ConnectionId, b: ConnectionId) -> bool {
        self.linked_host(a) == Some(b) || self.linked_host(b) == Some(a)
    }

    /// Removes every mapping created more than `ttl` before `now`.
    ///
    /// Age is measured from creation, not last use.  Links are kept.
    pub fn expire_mappings(&mut self, now: Instant, ttl: Duration) -> Vec<ConnectionId> {
        let mut expired = Vec::new();
        for entry in self.connections.values_mut() {
            let stale = matches!(
                &entry.state,
                ConnectionState::ClientPaired(m) if now.saturating_duration_since(m.established_at) > ttl
            );
            if stale {
                entry.state = ConnectionState::Connected;
                expired.push(entry.id);
            }
        }
        expired
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of live client-to-host mappings.
    pub fn mapping_count(&self) -> usize {
        self.connections
            .values()
            .filter(|entry| matches!(entry.state, ConnectionState::ClientPaired(_)))
            .count()
    }

    fn set_state(&mut self, id: ConnectionId, state: ConnectionState) -> bool {
        match self.connections.get_mut(&id) {
            Some(entry) => {
                entry.state = state;
                true
            }
            None => false,
        }
    }
}
