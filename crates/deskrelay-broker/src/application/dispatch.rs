//! Event dispatch: one handler per inbound event kind.
//!
//! Each handler takes the sender's id and the decoded payload, consults and
//! mutates the broker tables, and returns the [`Delivery`] list to send:
//! replies to the sender and notifications or relays to other connections.
//! Handlers never touch a socket.
//!
//! # Error boundary
//!
//! Handlers return `Result<Vec<Delivery>, BrokerError>`.  [`handle_event`]
//! turns an error into the reply the sender's request calls for:
//!
//! | request                         | error reply                                        |
//! |---------------------------------|----------------------------------------------------|
//! | `connect-with-code`             | `code-rejected`                                    |
//! | `connect-with-password`         | `connection-rejected`                              |
//! | `set-permanent-access`          | `permanent-access-response {success: false}`       |
//! | `connect-with-permanent-access` | `permanent-access-auth-response {success: false}`  |
//! | `revoke-permanent-access`       | `permanent-access-revoked {success: false}`        |
//! | relay kinds                     | nothing (logged and dropped)                       |
//! | anything else                   | `error {event, message}`                           |

use std::time::Instant;

use chrono::Utc;
use deskrelay_core::protocol::messages::{
    AccessGrantNotice, AutoConnectMethod, ClientAutoConnected, CodeAccepted, CodeRejected,
    ConnectWithCode, ConnectWithPassword, ConnectWithPermanentAccess, ConnectionAccepted,
    ConnectionRejected, ConnectionRequest, ConnectionResponse, DisconnectClient, ErrorNotice,
    FetchPermanentAccess, HostReady, PermanentAccessAuthResponse, PermanentAccessData,
    PermanentAccessResponse, PermanentAccessRevoked, RelayEnvelope, RevokePermanentAccess,
    SessionCode, SetPermanentAccess,
};
use deskrelay_core::{ConnectionId, InboundEvent, OutboundEvent, PairingCode, RelayKind};
use tracing::{debug, info, warn};

use crate::application::broker::{Broker, Delivery};
use crate::application::disconnect;
use crate::application::error::BrokerError;
use crate::application::registry::PairingMethod;
use crate::application::relay;
use crate::application::session_codes::Resolution;

type HandlerResult = Result<Vec<Delivery>, BrokerError>;

/// Handles one inbound event from `sender`.  Never fails: errors become
/// replies (or are dropped, for relays).
pub async fn handle_event(broker: &Broker, sender: ConnectionId, event: InboundEvent) -> Vec<Delivery> {
    let name = event.name();
    if !matches!(event, InboundEvent::Relay(ref env) if env.kind.is_input()) {
        debug!("← {sender}: {name}");
    }

    let result = match event {
        InboundEvent::KeepAlive => Ok(Vec::new()),
        InboundEvent::HostReady(m) => on_host_ready(broker, sender, m).await,
        InboundEvent::ConnectWithCode(m) => on_connect_with_code(broker, sender, m).await,
        InboundEvent::ConnectionResponse(m) => on_connection_response(broker, sender, m).await,
        InboundEvent::SetPermanentAccess(m) => on_set_permanent_access(broker, sender, m).await,
        InboundEvent::ConnectWithPermanentAccess(m) => {
            on_connect_with_permanent_access(broker, sender, m).await
        }
        InboundEvent::ConnectWithPassword(m) => on_connect_with_password(broker, sender, m).await,
        InboundEvent::FetchPermanentAccess(m) => on_fetch_permanent_access(broker, sender, m).await,
        InboundEvent::RevokePermanentAccess(m) => on_revoke_permanent_access(broker, sender, m).await,
        InboundEvent::DisconnectClient(m) => on_disconnect_client(broker, sender, m).await,
        InboundEvent::Relay(env) => on_relay(broker, sender, env).await,
    };

    match result {
        Ok(deliveries) => deliveries,
        Err(err) => reject(sender, name, err),
    }
}

/// Converts a handler error into the reply for `event`.
pub fn reject(sender: ConnectionId, event: &str, err: BrokerError) -> Vec<Delivery> {
    if RelayKind::from_event_name(event).is_some() {
        warn!("{sender}: {event} dropped: {err}");
        return Vec::new();
    }
    warn!("{sender}: {event} rejected: {err}");

    let message = err.to_string();
    let reply = match event {
        "connect-with-code" => OutboundEvent::CodeRejected(CodeRejected { message }),
        "connect-with-password" => OutboundEvent::ConnectionRejected(ConnectionRejected {
            host_id: None,
            message,
        }),
        "set-permanent-access" => OutboundEvent::PermanentAccessResponse(PermanentAccessResponse {
            success: false,
            client_id: None,
            label: None,
            message: Some(message),
        }),
        "connect-with-permanent-access" => {
            OutboundEvent::PermanentAccessAuthResponse(PermanentAccessAuthResponse {
                success: false,
                message: Some(message),
                ..Default::default()
            })
        }
        "revoke-permanent-access" => OutboundEvent::PermanentAccessRevoked(PermanentAccessRevoked {
            success: false,
            message: Some(message),
            ..Default::default()
        }),
        _ => OutboundEvent::Error(ErrorNotice {
            event: event.to_string(),
            message,
        }),
    };
    vec![Delivery::new(sender, reply)]
}

// ── Host handlers ─────────────────────────────────────────────────────────────

async fn on_host_ready(broker: &Broker, sender: ConnectionId, m: HostReady) -> HandlerResult {
    let mut sessions = broker.sessions.lock().await;
    let mut registry = broker.registry.lock().await;

    if !registry.is_connected(sender) {
        return Err(BrokerError::validation("connection is not registered"));
    }
    if registry.mapping(sender).is_some() {
        return Err(BrokerError::validation(
            "a paired client cannot announce itself as a host",
        ));
    }

    sessions.remove_requester(sender);
    let code = sessions.begin_host_session(sender, m.display_name, m.machine_id)?;
    registry.mark_host(sender);

    if let Some(session) = sessions.session(sender) {
        info!(
            "host {sender} ready: {:?} (machine {})",
            session.display_name,
            session.machine_id.as_deref().unwrap_or("-")
        );
    }
    Ok(vec![Delivery::new(
        sender,
        OutboundEvent::SessionCode(SessionCode { code }),
    )])
}

async fn on_connection_response(
    broker: &Broker,
    sender: ConnectionId,
    m: ConnectionResponse,
) -> HandlerResult {
    let mut deliveries = Vec::new();
    let legacy_grant;
    {
        let mut sessions = broker.sessions.lock().await;
        let mut registry = broker.registry.lock().await;

        let session = sessions
            .session(sender)
            .filter(|_| registry.is_host(sender))
            .ok_or_else(|| BrokerError::validation("only an active host can answer connection requests"))?;
        let display_name = session.display_name.clone();
        let machine_id = session.machine_id.clone();

        match sessions.resolve_connection(sender, m.client_id, m.accepted) {
            Resolution::NoOp => {
                debug!("{sender}: connection-response for {} already resolved", m.client_id);
                return Ok(Vec::new());
            }
            Resolution::Rejected => {
                if registry.mapping(m.client_id).is_none() {
                    registry.reset(m.client_id);
                }
                info!("host {sender} declined {}", m.client_id);
                deliveries.push(Delivery::new(
                    m.client_id,
                    OutboundEvent::ConnectionRejected(ConnectionRejected {
                        host_id: Some(sender),
                        message: "The host declined the connection".to_string(),
                    }),
                ));
                legacy_grant = None;
            }
            Resolution::Accepted(_) => {
                registry.pair(m.client_id, sender, PairingMethod::Code, Instant::now());
                info!("host {sender} accepted {}", m.client_id);
                deliveries.push(Delivery::new(
                    m.client_id,
                    OutboundEvent::ConnectionAccepted(ConnectionAccepted {
                        host_id: sender,
                        display_name,
                        automatic: false,
                        permanent_access: false,
                    }),
                ));
                legacy_grant = m.set_password.filter(|pw| !pw.is_empty()).map(|pw| (machine_id, pw));
            }
        }
    }

    // The pairing stands even if storing the password fails; the host hears
    // about the failure separately.
    if let Some((machine_id, password)) = legacy_grant {
        let stored = match machine_id {
            Some(machine_id) => {
                broker
                    .legacy
                    .grant_legacy(&machine_id, &m.client_id.to_string(), &password)
                    .await
            }
            None => Err(BrokerError::validation(
                "setPassword requires the host to announce a machineId",
            )),
        };
        if let Err(err) = stored {
            deliveries.extend(reject(sender, "connection-response", err));
        }
    }
    Ok(deliveries)
}

async fn on_set_permanent_access(
    broker: &Broker,
    sender: ConnectionId,
    m: SetPermanentAccess,
) -> HandlerResult {
    if m.client_id.trim().is_empty() || m.label.trim().is_empty() || m.password.is_empty() {
        return Err(BrokerError::validation("clientId, label and password are required"));
    }

    let (machine_id, display_name) = {
        let sessions = broker.sessions.lock().await;
        let session = sessions
            .session(sender)
            .ok_or_else(|| BrokerError::validation("only an active host can grant permanent access"))?;
        let machine_id = session.machine_id.clone().ok_or_else(|| {
            BrokerError::validation("permanent access requires the host to announce a machineId")
        })?;
        (machine_id, session.display_name.clone())
    };

    broker
        .credentials
        .grant(&machine_id, &display_name, &m.label, &m.password, &m.client_id)
        .await
        .map_err(BrokerError::from)?;

    // Tell the grantee on its next fetch, if it is connected right now.
    if let Ok(grantee) = m.client_id.parse::<ConnectionId>() {
        let registry = broker.registry.lock().await;
        if registry.is_connected(grantee) {
            broker.notifications.lock().await.push(
                grantee,
                AccessGrantNotice {
                    machine_id,
                    display_name,
                    label: m.label.clone(),
                    granted_at: Utc::now().timestamp_millis(),
                },
            );
        }
    }

    Ok(vec![Delivery::new(
        sender,
        OutboundEvent::PermanentAccessResponse(PermanentAccessResponse {
            success: true,
            client_id: Some(m.client_id),
            label: Some(m.label),
            message: None,
        }),
    )])
}

async fn on_disconnect_client(
    broker: &Broker,
    sender: ConnectionId,
    m: DisconnectClient,
) -> HandlerResult {
    let mut sessions = broker.sessions.lock().await;
    let mut registry = broker.registry.lock().await;
    if !registry.is_host(sender) {
        return Err(BrokerError::validation("only an active host can disconnect clients"));
    }
    let deliveries = disconnect::evict_client(&mut sessions, &mut registry, sender, m.client_id)?;
    info!("host {sender} disconnected client {}", m.client_id);
    Ok(deliveries)
}

// ── Client handlers ───────────────────────────────────────────────────────────

async fn on_connect_with_code(broker: &Broker, sender: ConnectionId, m: ConnectWithCode) -> HandlerResult {
    let code = PairingCode::parse(&m.code).map_err(|e| BrokerError::Validation(e.to_string()))?;

    let mut sessions = broker.sessions.lock().await;
    let mut registry = broker.registry.lock().await;
    if registry.is_host(sender) {
        return Err(BrokerError::validation("a host cannot connect to another host"));
    }

    let host_id = sessions
        .match_code(&code)
        .ok_or_else(|| BrokerError::not_found("Invalid code"))?;
    let display_name = sessions
        .session(host_id)
        .map(|s| s.display_name.clone())
        .unwrap_or_default();

    let now = Utc::now();
    if !sessions.request_connection(host_id, sender, now) {
        return Err(BrokerError::not_found("Invalid code"));
    }
    registry.mark_pending(sender, host_id);

    Ok(vec![
        Delivery::new(
            sender,
            OutboundEvent::CodeAccepted(CodeAccepted {
                host_id,
                display_name,
            }),
        ),
        Delivery::new(
            host_id,
            OutboundEvent::ConnectionRequest(ConnectionRequest {
                client_id: sender,
                timestamp: now.timestamp_millis(),
            }),
        ),
    ])
}

async fn on_connect_with_permanent_access(
    broker: &Broker,
    sender: ConnectionId,
    m: ConnectWithPermanentAccess,
) -> HandlerResult {
    if m.machine_id.trim().is_empty() || m.label.trim().is_empty() || m.password.is_empty() {
        return Err(BrokerError::validation("machineId, label and password are required"));
    }
    ensure_not_host(broker, sender).await?;

    let auth = broker
        .credentials
        .authenticate(&m.machine_id, &m.label, &m.password)
        .await
        .map_err(BrokerError::from)?;

    let (host_id, display_name) = auto_pair(broker, sender, &m.machine_id, PairingMethod::PermanentAccess).await?;
    info!(
        "{sender} paired with host {host_id} using permanent access {:?}",
        auth.label
    );

    Ok(vec![
        Delivery::new(
            sender,
            OutboundEvent::PermanentAccessAuthResponse(PermanentAccessAuthResponse {
                success: true,
                host_id: Some(host_id),
                display_name: Some(display_name.clone()),
                machine_id: Some(auth.machine_id),
                label: Some(auth.label),
                message: None,
            }),
        ),
        Delivery::new(
            sender,
            OutboundEvent::ConnectionAccepted(ConnectionAccepted {
                host_id,
                display_name,
                automatic: true,
                permanent_access: true,
            }),
        ),
        Delivery::new(
            host_id,
            OutboundEvent::ClientAutoConnected(ClientAutoConnected {
                client_id: sender,
                method: AutoConnectMethod::PermanentAccess,
            }),
        ),
    ])
}

async fn on_connect_with_password(
    broker: &Broker,
    sender: ConnectionId,
    m: ConnectWithPassword,
) -> HandlerResult {
    if m.machine_id.trim().is_empty() || m.password.is_empty() {
        return Err(BrokerError::validation("machineId and password are required"));
    }
    ensure_not_host(broker, sender).await?;

    broker.legacy.authenticate_legacy(&m.machine_id, &m.password).await?;
    let (host_id, display_name) = auto_pair(broker, sender, &m.machine_id, PairingMethod::LegacyPassword).await?;
    info!("{sender} paired with host {host_id} using a legacy password");

    Ok(vec![
        Delivery::new(
            sender,
            OutboundEvent::ConnectionAccepted(ConnectionAccepted {
                host_id,
                display_name,
                automatic: true,
                permanent_access: false,
            }),
        ),
        Delivery::new(
            host_id,
            OutboundEvent::ClientAutoConnected(ClientAutoConnected {
                client_id: sender,
                method: AutoConnectMethod::LegacyPassword,
            }),
        ),
    ])
}

/// Lists the credentials owned by the *named* `clientId`.
///
/// `clientId` here is the controller's persistent identity (the value the host
/// granted against), not the connection id of the sender, so the listing is
/// keyed by the payload rather than by `sender`.  Knowing a clientId is what
/// entitles a controller to its own metadata.  The reply carries labels and
/// timestamps only; password hashes never leave the store.  Pending grant
/// notices are drained for `sender`, the connection that is asking.
async fn on_fetch_permanent_access(
    broker: &Broker,
    sender: ConnectionId,
    m: FetchPermanentAccess,
) -> HandlerResult {
    if m.client_id.trim().is_empty() {
        return Err(BrokerError::validation("clientId is required"));
    }
    let machines = broker
        .credentials
        .list_for_client(&m.client_id)
        .await
        .map_err(BrokerError::from)?;
    let granted = broker.notifications.lock().await.drain(sender);

    Ok(vec![Delivery::new(
        sender,
        OutboundEvent::PermanentAccessData(PermanentAccessData {
            client_id: m.client_id,
            machines,
            granted,
        }),
    )])
}

/// Withdraws one of the named controller's own credentials.  Same identity
/// rule as [`on_fetch_permanent_access`]: the owner is the payload's
/// `clientId`, and only an entry with that owner and label can be removed.
async fn on_revoke_permanent_access(
    broker: &Broker,
    sender: ConnectionId,
    m: RevokePermanentAccess,
) -> HandlerResult {
    if m.machine_id.trim().is_empty() || m.label.trim().is_empty() || m.client_id.trim().is_empty() {
        return Err(BrokerError::validation("machineId, label and clientId are required"));
    }
    ensure_not_host(broker, sender).await?;

    broker
        .credentials
        .revoke(&m.machine_id, &m.label, &m.client_id)
        .await
        .map_err(BrokerError::from)?;
    info!("{sender} revoked permanent access {:?} on machine {}", m.label, m.machine_id);

    Ok(vec![Delivery::new(
        sender,
        OutboundEvent::PermanentAccessRevoked(PermanentAccessRevoked {
            success: true,
            machine_id: m.machine_id,
            label: m.label,
            message: None,
        }),
    )])
}

// ── Relay ─────────────────────────────────────────────────────────────────────

async fn on_relay(broker: &Broker, sender: ConnectionId, envelope: RelayEnvelope) -> HandlerResult {
    let registry = broker.registry.lock().await;
    let delivery = relay::route(&registry, sender, envelope)?;
    Ok(vec![delivery])
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn ensure_not_host(broker: &Broker, sender: ConnectionId) -> Result<(), BrokerError> {
    if broker.registry.lock().await.is_host(sender) {
        return Err(BrokerError::validation("a host cannot connect to another host"));
    }
    Ok(())
}

/// Pairs `sender` with the active host announcing `machine_id`, skipping the
/// approval step.  Returns the host id and its display name.
async fn auto_pair(
    broker: &Broker,
    sender: ConnectionId,
    machine_id: &str,
    via: PairingMethod,
) -> Result<(ConnectionId, String), BrokerError> {
    let mut sessions = broker.sessions.lock().await;
    let mut registry = broker.registry.lock().await;

    if registry.is_host(sender) {
        return Err(BrokerError::validation("a host cannot connect to another host"));
    }
    let (host_id, display_name) = sessions
        .host_for_machine(machine_id)
        .map(|s| (s.host_id, s.display_name.clone()))
        .ok_or_else(|| BrokerError::not_found("The host is not online"))?;

    sessions.remove_requester(sender);
    registry.pair(sender, host_id, via, Instant::now());
    Ok((host_id, display_name))
}
