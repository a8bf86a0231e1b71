//! Disconnect cascade: cleans up after a vanished connection and tells its
//! counterparties straight away.
//!
//! When connection X goes away:
//!
//! 1. If X was a host its session ends (the code becomes reusable) and every
//!    client mapped to X receives `host-disconnected` with the last-known
//!    display name and machine id.  Those mappings are removed.
//! 2. X is removed from every host's pending list.
//! 3. X's own mapping, if it was a client, is removed.  The host is not
//!    notified; its transport sees the peer leave on its own.
//! 4. Grant notices still queued for X are dropped.
//! 5. X is unregistered.
//!
//! A host can also evict one client without any transport event
//! ([`evict_client`]); the client is told with a manual-disconnect reason.
//!
//! Both functions are synchronous and operate on the tables directly; the
//! async wrappers in [`Broker`](crate::application::broker::Broker) and the
//! dispatch table take the locks.

use deskrelay_core::protocol::messages::{
    DisconnectReason, HostDisconnected, OutboundEvent, DEFAULT_DISPLAY_NAME,
};
use deskrelay_core::ConnectionId;

use crate::application::broker::Delivery;
use crate::application::error::BrokerError;
use crate::application::notifications::NotificationQueue;
use crate::application::registry::{ConnectionRegistry, ConnectionState};
use crate::application::session_codes::{HostSession, Resolution, SessionCodeBroker};

/// What the cascade did.
#[derive(Debug)]
pub struct CascadeOutcome {
    /// `host-disconnected` notifications for former clients.
    pub deliveries: Vec<Delivery>,
    /// The session that ended, when the connection was a host.
    pub ended_session: Option<HostSession>,
    pub dropped_notices: usize,
}

/// Runs the cascade for `id`.
pub fn cascade(
    sessions: &mut SessionCodeBroker,
    registry: &mut ConnectionRegistry,
    notifications: &mut NotificationQueue,
    id: ConnectionId,
    reason: DisconnectReason,
) -> CascadeOutcome {
    let ended_session = sessions.end_session(id);
    sessions.remove_requester(id);

    let (display_name, machine_id) = match &ended_session {
        Some(session) => (session.display_name.clone(), session.machine_id.clone()),
        None => (DEFAULT_DISPLAY_NAME.to_string(), None),
    };
    let deliveries = registry
        .take_clients_of(id)
        .into_iter()
        .map(|(client, _)| {
            host_disconnected(client, id, &display_name, machine_id.clone(), reason.clone())
        })
        .collect();

    registry.unpair(id);
    let dropped_notices = notifications.discard(id);
    registry.unregister(id);

    CascadeOutcome {
        deliveries,
        ended_session,
        dropped_notices,
    }
}

/// Evicts `client` from `host`.
///
/// A paired client loses its mapping and its link (even when the reaper has
/// already taken the mapping); a pending client loses its request.
/// Either way it receives `host-disconnected` with
/// [`DisconnectReason::ManualDisconnect`].
///
/// # Errors
///
/// - [`BrokerError::Validation`] when `host` has no active session.
/// - [`BrokerError::NotFound`] when `client` is neither paired with nor
///   waiting on `host`.
pub fn evict_client(
    sessions: &mut SessionCodeBroker,
    registry: &mut ConnectionRegistry,
    host: ConnectionId,
    client: ConnectionId,
) -> Result<Vec<Delivery>, BrokerError> {
    let session = sessions
        .session(host)
        .ok_or_else(|| BrokerError::validation("only an active host can disconnect clients"))?;
    let display_name = session.display_name.clone();
    let machine_id = session.machine_id.clone();

    if registry.linked_host(client) == Some(host) {
        registry.unpair(client);
    } else {
        match sessions.resolve_connection(host, client, false) {
            Resolution::Rejected => {
                if registry.state(client) == Some(&ConnectionState::ClientPending { host_id: host }) {
                    registry.reset(client);
                }
            }
            Resolution::Accepted(_) | Resolution::NoOp => {
                return Err(BrokerError::not_found("client is not connected to this host"));
            }
        }
    }

    Ok(vec![host_disconnected(
        client,
        host,
        &display_name,
        machine_id,
        DisconnectReason::ManualDisconnect,
    )])
}

fn host_disconnected(
    client: ConnectionId,
    host_id: ConnectionId,
    display_name: &str,
    machine_id: Option<String>,
    reason: DisconnectReason,
) -> Delivery {
    Delivery::new(
        client,
        OutboundEvent::HostDisconnected(HostDisconnected {
            host_id,
            display_name: display_name.to_string(),
            machine_id,
            reason,
        }),
    )
}
