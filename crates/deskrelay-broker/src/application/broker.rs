//! Shared broker state and its connection lifecycle entry points.
//!
//! # What lives here? (for beginners)
//!
//! Every connection task in the server holds an `Arc<Broker>`.  The broker
//! owns one lock per shared table instead of one global lock, so two hosts
//! registering at the same time only contend on the session table for the
//! few microseconds it takes to insert a code:
//!
//! | field            | guards                                      |
//! |------------------|---------------------------------------------|
//! | `sessions`       | host sessions, codes, pending approvals      |
//! | `registry`       | live connections and client→host mappings    |
//! | `notifications`  | queued permanent-access grant notices        |
//! | `credentials`    | durable credentials (its own internal lock)  |
//! | `legacy`         | legacy trust table (its own internal lock)   |
//!
//! # Lock order
//!
//! When more than one table is needed the locks are taken in the order
//! `sessions → registry → notifications`, and never across a durable write
//! or a network send.  Handlers compute [`Delivery`] values under the locks
//! and the transport sends them after the locks are released.

use std::time::Instant;

use deskrelay_core::protocol::messages::{DisconnectReason, OutboundEvent};
use deskrelay_core::{ConnectionId, InboundEvent};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::application::credentials::CredentialStore;
use crate::application::disconnect;
use crate::application::dispatch;
use crate::application::legacy_trust::LegacyTrustStore;
use crate::application::notifications::NotificationQueue;
use crate::application::registry::ConnectionRegistry;
use crate::application::session_codes::SessionCodeBroker;

/// One outbound event addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: ConnectionId,
    pub event: OutboundEvent,
}

impl Delivery {
    pub fn new(to: ConnectionId, event: OutboundEvent) -> Self {
        Self { to, event }
    }
}

/// Point-in-time counters, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokerStats {
    pub connections: usize,
    pub hosts: usize,
    pub mappings: usize,
}

/// The connection broker.
pub struct Broker {
    pub(crate) sessions: Mutex<SessionCodeBroker>,
    pub(crate) registry: Mutex<ConnectionRegistry>,
    pub(crate) notifications: Mutex<NotificationQueue>,
    pub(crate) credentials: CredentialStore,
    pub(crate) legacy: LegacyTrustStore,
}

impl Broker {
    pub fn new(
        sessions: SessionCodeBroker,
        credentials: CredentialStore,
        legacy: LegacyTrustStore,
    ) -> Self {
        Self {
            sessions: Mutex::new(sessions),
            registry: Mutex::new(ConnectionRegistry::new()),
            notifications: Mutex::new(NotificationQueue::new()),
            credentials,
            legacy,
        }
    }

    /// Registers a freshly accepted connection.
    pub async fn connect(&self, id: ConnectionId) {
        self.registry.lock().await.register(id, Instant::now());
        debug!("connection {id} registered");
    }

    /// Handles one decoded inbound event from `sender`.
    pub async fn handle(&self, sender: ConnectionId, event: InboundEvent) -> Vec<Delivery> {
        dispatch::handle_event(self, sender, event).await
    }

    /// Runs the disconnect cascade for `id` and returns the notifications to
    /// send to its counterparties.
    pub async fn disconnect(&self, id: ConnectionId, reason: DisconnectReason) -> Vec<Delivery> {
        let mut sessions = self.sessions.lock().await;
        let mut registry = self.registry.lock().await;
        let mut notifications = self.notifications.lock().await;

        let outcome = disconnect::cascade(
            &mut sessions,
            &mut registry,
            &mut notifications,
            id,
            reason.clone(),
        );

        if let Some(session) = &outcome.ended_session {
            info!(
                "host {id} ({}) disconnected: {reason}; notifying {} client(s)",
                session.display_name,
                outcome.deliveries.len()
            );
        } else {
            debug!("connection {id} disconnected: {reason}");
        }
        if outcome.dropped_notices > 0 {
            debug!(
                "dropped {} undelivered grant notice(s) for {id}",
                outcome.dropped_notices
            );
        }
        outcome.deliveries
    }

    pub async fn stats(&self) -> BrokerStats {
        let hosts = self.sessions.lock().await.len();
        let registry = self.registry.lock().await;
        BrokerStats {
            connections: registry.len(),
            hosts,
            mappings: registry.mapping_count(),
        }
    }

    /// The durable credential store.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// The legacy trust store.
    pub fn legacy_trust(&self) -> &LegacyTrustStore {
        &self.legacy
    }
}
