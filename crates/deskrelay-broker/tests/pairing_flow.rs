//! End-to-end pairing scenarios driven through the broker's public entry
//! points (`connect` / `handle` / `disconnect`), without any transport.

use std::time::Duration;

use deskrelay_broker::application::reaper::reap_once;
use deskrelay_broker::application::session_codes::FixedCodeSource;
use deskrelay_broker::infrastructure::bootstrap::{in_memory_broker, in_memory_broker_from};
use deskrelay_broker::{Broker, Delivery};
use deskrelay_core::protocol::messages::{
    AutoConnectMethod, ConnectWithCode, ConnectWithPassword, ConnectWithPermanentAccess,
    ConnectionResponse, DisconnectClient, DisconnectReason, FetchPermanentAccess, HostReady,
    SetPermanentAccess,
};
use deskrelay_core::{ConnectionId, InboundEvent, OutboundEvent, PairingCode, RelayKind};
use deskrelay_core::protocol::RelayEnvelope;
use serde_json::{json, Value};

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn join(broker: &Broker) -> ConnectionId {
    let id = ConnectionId::new();
    broker.connect(id).await;
    id
}

async fn host_ready(broker: &Broker, host: ConnectionId, name: &str, machine: &str) -> PairingCode {
    let out = broker
        .handle(
            host,
            InboundEvent::HostReady(HostReady {
                display_name: Some(name.to_string()),
                machine_id: Some(machine.to_string()),
            }),
        )
        .await;
    assert_eq!(out.len(), 1);
    match &out[0].event {
        OutboundEvent::SessionCode(m) => m.code.clone(),
        other => panic!("expected session-code, got {other:?}"),
    }
}

async fn pair_by_code(broker: &Broker, host: ConnectionId, client: ConnectionId, code: &PairingCode) {
    broker
        .handle(
            client,
            InboundEvent::ConnectWithCode(ConnectWithCode {
                code: code.to_string(),
            }),
        )
        .await;
    let out = broker
        .handle(
            host,
            InboundEvent::ConnectionResponse(ConnectionResponse {
                client_id: client,
                accepted: true,
                set_password: None,
            }),
        )
        .await;
    assert!(matches!(out[0].event, OutboundEvent::ConnectionAccepted(_)));
}

fn relay(kind: RelayKind, to: ConnectionId, extra: Value) -> InboundEvent {
    let Value::Object(mut payload) = extra else {
        panic!("relay payload must be an object");
    };
    payload.insert("to".into(), Value::String(to.to_string()));
    InboundEvent::Relay(RelayEnvelope { kind, to, payload })
}

fn only(deliveries: &[Delivery]) -> &Delivery {
    assert_eq!(deliveries.len(), 1, "expected exactly one delivery: {deliveries:?}");
    &deliveries[0]
}

// ── Code pairing ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_code_pairing_flow() {
    // Arrange
    let code = PairingCode::parse("482913").unwrap();
    let broker = in_memory_broker_from(Box::new(FixedCodeSource::new([code.clone()])));
    let host = join(&broker).await;
    let client = join(&broker).await;

    // Act 1: host announces itself.
    let issued = host_ready(&broker, host, "Studio PC", "M1").await;
    assert_eq!(issued, code);

    // Act 2: client enters the code.
    let out = broker
        .handle(
            client,
            InboundEvent::ConnectWithCode(ConnectWithCode {
                code: "482913".into(),
            }),
        )
        .await;

    // Assert 2
    assert_eq!(out.len(), 2);
    let OutboundEvent::CodeAccepted(accepted) = &out[0].event else {
        panic!("expected code-accepted");
    };
    assert_eq!(out[0].to, client);
    assert_eq!(accepted.host_id, host);
    assert_eq!(accepted.display_name, "Studio PC");
    let OutboundEvent::ConnectionRequest(request) = &out[1].event else {
        panic!("expected connection-request");
    };
    assert_eq!(out[1].to, host);
    assert_eq!(request.client_id, client);

    // Act 3: host approves.
    let out = broker
        .handle(
            host,
            InboundEvent::ConnectionResponse(ConnectionResponse {
                client_id: client,
                accepted: true,
                set_password: None,
            }),
        )
        .await;

    // Assert 3
    let delivery = only(&out);
    assert_eq!(delivery.to, client);
    let OutboundEvent::ConnectionAccepted(m) = &delivery.event else {
        panic!("expected connection-accepted");
    };
    assert_eq!(m.host_id, host);
    assert!(!m.automatic);
    assert_eq!(broker.stats().await.mappings, 1);
}

#[tokio::test]
async fn test_unissued_code_is_rejected() {
    let broker = in_memory_broker_from(Box::new(FixedCodeSource::new([
        PairingCode::parse("123456").unwrap(),
    ])));
    let host = join(&broker).await;
    let client = join(&broker).await;
    host_ready(&broker, host, "Studio", "M1").await;

    let out = broker
        .handle(
            client,
            InboundEvent::ConnectWithCode(ConnectWithCode {
                code: "000000".into(),
            }),
        )
        .await;

    let delivery = only(&out);
    assert_eq!(delivery.to, client);
    assert!(matches!(delivery.event, OutboundEvent::CodeRejected(_)));
}

#[tokio::test]
async fn test_declined_request_tells_client_and_allows_retry() {
    // Arrange
    let broker = in_memory_broker().await;
    let host = join(&broker).await;
    let client = join(&broker).await;
    let code = host_ready(&broker, host, "Studio", "M1").await;
    broker
        .handle(client, InboundEvent::ConnectWithCode(ConnectWithCode { code: code.to_string() }))
        .await;

    // Act
    let out = broker
        .handle(
            host,
            InboundEvent::ConnectionResponse(ConnectionResponse {
                client_id: client,
                accepted: false,
                set_password: None,
            }),
        )
        .await;

    // Assert
    let OutboundEvent::ConnectionRejected(m) = &only(&out).event else {
        panic!("expected connection-rejected");
    };
    assert_eq!(m.host_id, Some(host));
    assert_eq!(broker.stats().await.mappings, 0);

    let retry = broker
        .handle(client, InboundEvent::ConnectWithCode(ConnectWithCode { code: code.to_string() }))
        .await;
    assert!(matches!(retry[0].event, OutboundEvent::CodeAccepted(_)));
}

#[tokio::test]
async fn test_repeated_connection_response_is_a_no_op() {
    let broker = in_memory_broker().await;
    let host = join(&broker).await;
    let client = join(&broker).await;
    let code = host_ready(&broker, host, "Studio", "M1").await;
    pair_by_code(&broker, host, client, &code).await;

    let again = broker
        .handle(
            host,
            InboundEvent::ConnectionResponse(ConnectionResponse {
                client_id: client,
                accepted: true,
                set_password: None,
            }),
        )
        .await;

    assert!(again.is_empty());
    assert_eq!(broker.stats().await.mappings, 1);
}

#[tokio::test]
async fn test_second_host_ready_releases_old_code() {
    let broker = in_memory_broker_from(Box::new(FixedCodeSource::new([
        PairingCode::parse("111111").unwrap(),
        PairingCode::parse("222222").unwrap(),
    ])));
    let host = join(&broker).await;
    let client = join(&broker).await;

    let first = host_ready(&broker, host, "Studio", "M1").await;
    let second = host_ready(&broker, host, "Studio", "M1").await;
    assert_ne!(first, second);

    let out = broker
        .handle(client, InboundEvent::ConnectWithCode(ConnectWithCode { code: first.to_string() }))
        .await;
    assert!(matches!(out[0].event, OutboundEvent::CodeRejected(_)));
    assert_eq!(broker.stats().await.hosts, 1);
}

// ── Disconnect cascade ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_host_disconnect_notifies_paired_client_once() {
    // Arrange
    let broker = in_memory_broker().await;
    let host = join(&broker).await;
    let client = join(&broker).await;
    let code = host_ready(&broker, host, "Studio", "M1").await;
    pair_by_code(&broker, host, client, &code).await;

    // Act
    let out = broker
        .disconnect(host, DisconnectReason::TransportClosed("transport close".into()))
        .await;

    // Assert
    let delivery = only(&out);
    assert_eq!(delivery.to, client);
    let OutboundEvent::HostDisconnected(m) = &delivery.event else {
        panic!("expected host-disconnected");
    };
    assert_eq!(m.host_id, host);
    assert_eq!(m.display_name, "Studio");
    assert_eq!(m.machine_id.as_deref(), Some("M1"));

    let stats = broker.stats().await;
    assert_eq!(stats.hosts, 0);
    assert_eq!(stats.mappings, 0);
    assert_eq!(stats.connections, 1);

    // A second close of the same connection notifies nobody.
    assert!(broker
        .disconnect(host, DisconnectReason::TransportClosed("again".into()))
        .await
        .is_empty());
}

#[tokio::test]
async fn test_host_can_evict_a_paired_client() {
    let broker = in_memory_broker().await;
    let host = join(&broker).await;
    let client = join(&broker).await;
    let code = host_ready(&broker, host, "Studio", "M1").await;
    pair_by_code(&broker, host, client, &code).await;

    let out = broker
        .handle(
            host,
            InboundEvent::DisconnectClient(DisconnectClient { client_id: client }),
        )
        .await;

    let OutboundEvent::HostDisconnected(m) = &only(&out).event else {
        panic!("expected host-disconnected");
    };
    assert_eq!(m.reason, DisconnectReason::ManualDisconnect);
    assert_eq!(broker.stats().await.mappings, 0);
}

// ── Reaper ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reaper_keeps_young_mapping_and_removes_old_one() {
    let broker = in_memory_broker().await;
    let host = join(&broker).await;
    let client = join(&broker).await;
    let code = host_ready(&broker, host, "Studio", "M1").await;
    pair_by_code(&broker, host, client, &code).await;

    assert_eq!(reap_once(&broker, Duration::from_secs(3600)).await, 0);
    assert_eq!(broker.stats().await.mappings, 1);

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(reap_once(&broker, Duration::from_millis(1)).await, 1);
    assert_eq!(broker.stats().await.mappings, 0);

    // Relay still flows after the mapping is gone.
    let out = broker
        .handle(client, relay(RelayKind::Answer, host, json!({"sdp": "v=0"})))
        .await;
    assert_eq!(only(&out).to, host);
}

// ── Relay ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_relay_stamps_sender_and_keeps_payload() {
    // Arrange
    let broker = in_memory_broker().await;
    let host = join(&broker).await;
    let client = join(&broker).await;
    let code = host_ready(&broker, host, "Studio", "M1").await;
    pair_by_code(&broker, host, client, &code).await;

    // Act
    let out = broker
        .handle(
            client,
            relay(
                RelayKind::IceCandidate,
                host,
                json!({"candidate": "candidate:1 1 UDP 2122252543 10.0.0.2 51000 typ host", "from": "spoofed"}),
            ),
        )
        .await;

    // Assert
    let delivery = only(&out);
    assert_eq!(delivery.to, host);
    let OutboundEvent::Relayed(m) = &delivery.event else {
        panic!("expected relayed message");
    };
    assert_eq!(m.kind, RelayKind::IceCandidate);
    assert_eq!(m.payload["from"], json!(client.to_string()));
    assert!(m.payload["candidate"].as_str().unwrap().starts_with("candidate:1"));
}

#[tokio::test]
async fn test_declined_client_cannot_relay_input_to_host() {
    // Arrange: the client learns the host id from code-accepted, then the
    // host declines it.
    let broker = in_memory_broker().await;
    let host = join(&broker).await;
    let client = join(&broker).await;
    let code = host_ready(&broker, host, "Studio", "M1").await;
    broker
        .handle(
            client,
            InboundEvent::ConnectWithCode(ConnectWithCode {
                code: code.to_string(),
            }),
        )
        .await;
    let out = broker
        .handle(
            host,
            InboundEvent::ConnectionResponse(ConnectionResponse {
                client_id: client,
                accepted: false,
                set_password: None,
            }),
        )
        .await;
    assert!(matches!(only(&out).event, OutboundEvent::ConnectionRejected(_)));

    // Act
    let out = broker
        .handle(client, relay(RelayKind::RemoteKeyPress, host, json!({"key": "Enter"})))
        .await;

    // Assert
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_pending_client_cannot_relay_before_approval() {
    let broker = in_memory_broker().await;
    let host = join(&broker).await;
    let client = join(&broker).await;
    let code = host_ready(&broker, host, "Studio", "M1").await;
    broker
        .handle(
            client,
            InboundEvent::ConnectWithCode(ConnectWithCode {
                code: code.to_string(),
            }),
        )
        .await;

    let out = broker
        .handle(client, relay(RelayKind::RemoteMouseClick, host, json!({"button": 0})))
        .await;

    assert!(out.is_empty());
}

#[tokio::test]
async fn test_evicted_client_can_no_longer_relay() {
    let broker = in_memory_broker().await;
    let host = join(&broker).await;
    let client = join(&broker).await;
    let code = host_ready(&broker, host, "Studio", "M1").await;
    pair_by_code(&broker, host, client, &code).await;
    broker
        .handle(
            host,
            InboundEvent::DisconnectClient(DisconnectClient { client_id: client }),
        )
        .await;

    let out = broker
        .handle(client, relay(RelayKind::RemoteMouseScroll, host, json!({"deltaY": 3})))
        .await;

    assert!(out.is_empty());
}

#[tokio::test]
async fn test_relay_to_departed_connection_is_dropped() {
    let broker = in_memory_broker().await;
    let a = join(&broker).await;
    let b = join(&broker).await;
    broker
        .disconnect(b, DisconnectReason::TransportClosed("gone".into()))
        .await;

    let out = broker
        .handle(a, relay(RelayKind::RemoteMouseMove, b, json!({"x": 1, "y": 2})))
        .await;

    assert!(out.is_empty());
}

// ── Permanent access ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_permanent_access_grant_then_auto_connect() {
    // Arrange: host M1 grants "laptop" to the client.
    let broker = in_memory_broker().await;
    let host = join(&broker).await;
    let client = join(&broker).await;
    host_ready(&broker, host, "Studio", "M1").await;
    let out = broker
        .handle(
            host,
            InboundEvent::SetPermanentAccess(SetPermanentAccess {
                client_id: client.to_string(),
                label: "laptop".into(),
                password: "hunter2".into(),
            }),
        )
        .await;
    let OutboundEvent::PermanentAccessResponse(granted) = &only(&out).event else {
        panic!("expected permanent-access-response");
    };
    assert!(granted.success);

    // Act
    let out = broker
        .handle(
            client,
            InboundEvent::ConnectWithPermanentAccess(ConnectWithPermanentAccess {
                machine_id: "M1".into(),
                label: "laptop".into(),
                password: "hunter2".into(),
            }),
        )
        .await;

    // Assert
    assert_eq!(out.len(), 3);
    assert!(matches!(&out[0].event, OutboundEvent::PermanentAccessAuthResponse(r) if r.success));
    assert!(matches!(
        &out[1].event,
        OutboundEvent::ConnectionAccepted(m) if m.automatic && m.permanent_access && m.host_id == host
    ));
    assert_eq!(out[2].to, host);
    assert!(matches!(
        &out[2].event,
        OutboundEvent::ClientAutoConnected(m)
            if m.client_id == client && m.method == AutoConnectMethod::PermanentAccess
    ));
    assert_eq!(broker.stats().await.mappings, 1);
}

#[tokio::test]
async fn test_permanent_access_wrong_password_fails() {
    let broker = in_memory_broker().await;
    let host = join(&broker).await;
    let client = join(&broker).await;
    host_ready(&broker, host, "Studio", "M1").await;
    broker
        .handle(
            host,
            InboundEvent::SetPermanentAccess(SetPermanentAccess {
                client_id: client.to_string(),
                label: "laptop".into(),
                password: "right".into(),
            }),
        )
        .await;

    let out = broker
        .handle(
            client,
            InboundEvent::ConnectWithPermanentAccess(ConnectWithPermanentAccess {
                machine_id: "M1".into(),
                label: "laptop".into(),
                password: "wrong".into(),
            }),
        )
        .await;

    assert!(matches!(
        &only(&out).event,
        OutboundEvent::PermanentAccessAuthResponse(r) if !r.success
    ));
    assert_eq!(broker.stats().await.mappings, 0);
}

#[tokio::test]
async fn test_permanent_access_to_offline_host_fails_after_valid_auth() {
    let broker = in_memory_broker().await;
    let host = join(&broker).await;
    let client = join(&broker).await;
    host_ready(&broker, host, "Studio", "M1").await;
    broker
        .handle(
            host,
            InboundEvent::SetPermanentAccess(SetPermanentAccess {
                client_id: client.to_string(),
                label: "laptop".into(),
                password: "pw".into(),
            }),
        )
        .await;
    broker
        .disconnect(host, DisconnectReason::TransportClosed("closed".into()))
        .await;

    let out = broker
        .handle(
            client,
            InboundEvent::ConnectWithPermanentAccess(ConnectWithPermanentAccess {
                machine_id: "M1".into(),
                label: "laptop".into(),
                password: "pw".into(),
            }),
        )
        .await;

    let OutboundEvent::PermanentAccessAuthResponse(r) = &only(&out).event else {
        panic!("expected permanent-access-auth-response");
    };
    assert!(!r.success);
    assert_eq!(r.message.as_deref(), Some("The host is not online"));
}

#[tokio::test]
async fn test_fetch_lists_granted_machines_without_hashes() {
    let broker = in_memory_broker().await;
    let host = join(&broker).await;
    let client = join(&broker).await;
    host_ready(&broker, host, "Studio", "M1").await;
    broker
        .handle(
            host,
            InboundEvent::SetPermanentAccess(SetPermanentAccess {
                client_id: "device-42".into(),
                label: "laptop".into(),
                password: "pw".into(),
            }),
        )
        .await;

    let out = broker
        .handle(
            client,
            InboundEvent::FetchPermanentAccess(FetchPermanentAccess {
                client_id: "device-42".into(),
            }),
        )
        .await;

    let OutboundEvent::PermanentAccessData(data) = &only(&out).event else {
        panic!("expected permanent-access-data");
    };
    assert_eq!(data.machines.len(), 1);
    let encoded = deskrelay_core::encode_outbound(&out[0].event).unwrap();
    assert!(!encoded.contains("passwordHash"));
    assert!(!encoded.contains("argon2id$"));
}

// ── Legacy password ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_legacy_password_set_on_accept_then_used_to_reconnect() {
    // Arrange
    let broker = in_memory_broker().await;
    let host = join(&broker).await;
    let client = join(&broker).await;
    let code = host_ready(&broker, host, "Studio", "M1").await;
    broker
        .handle(client, InboundEvent::ConnectWithCode(ConnectWithCode { code: code.to_string() }))
        .await;
    let out = broker
        .handle(
            host,
            InboundEvent::ConnectionResponse(ConnectionResponse {
                client_id: client,
                accepted: true,
                set_password: Some("legacy-pw".into()),
            }),
        )
        .await;
    assert_eq!(out.len(), 1);
    broker
        .disconnect(client, DisconnectReason::TransportClosed("closed".into()))
        .await;

    // Act
    let returning = join(&broker).await;
    let out = broker
        .handle(
            returning,
            InboundEvent::ConnectWithPassword(ConnectWithPassword {
                machine_id: "M1".into(),
                password: "legacy-pw".into(),
            }),
        )
        .await;

    // Assert
    assert_eq!(out.len(), 2);
    assert!(matches!(
        &out[0].event,
        OutboundEvent::ConnectionAccepted(m) if m.automatic && !m.permanent_access
    ));
    assert!(matches!(
        &out[1].event,
        OutboundEvent::ClientAutoConnected(m) if m.method == AutoConnectMethod::LegacyPassword
    ));
}

#[tokio::test]
async fn test_legacy_password_failures_are_indistinct() {
    let broker = in_memory_broker().await;
    let client = join(&broker).await;

    let unknown_machine = broker
        .handle(
            client,
            InboundEvent::ConnectWithPassword(ConnectWithPassword {
                machine_id: "nowhere".into(),
                password: "pw".into(),
            }),
        )
        .await;

    let OutboundEvent::ConnectionRejected(m) = &only(&unknown_machine).event else {
        panic!("expected connection-rejected");
    };
    assert_eq!(m.message, "invalid machine or password");
    assert!(m.host_id.is_none());
}
