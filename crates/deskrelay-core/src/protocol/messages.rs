//! The DeskRelay signaling catalogue.
//!
//! Every frame on the wire is a JSON object with an `"event"` discriminant and
//! a `"data"` object holding camelCase fields:
//!
//! ```json
//! {"event":"connect-with-code","data":{"code":"482913"}}
//! {"event":"offer","data":{"to":"6f1c…","sdp":"v=0…"}}
//! ```
//!
//! # Why separate inbound and outbound types?
//!
//! Hosts and controllers *send* requests (`host-ready`, `connect-with-code`,
//! …); the broker *sends* responses and notifications (`session-code`,
//! `host-disconnected`, …).  Two distinct enums make it a compile-time error to
//! answer a client with a request-shaped message, and vice versa.  Relay events
//! appear on both sides because the broker forwards them verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::code::PairingCode;
use crate::domain::ids::ConnectionId;

/// Display name used when a host does not announce one.
pub const DEFAULT_DISPLAY_NAME: &str = "Unknown Host";

// ── Relay kinds ───────────────────────────────────────────────────────────────

/// Event kinds the broker forwards between the two parties of a pairing
/// without looking inside the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayKind {
    Offer,
    Answer,
    IceCandidate,
    RemoteMouseMove,
    RemoteMouseClick,
    RemoteMouseScroll,
    RemoteKeyPress,
    RemoteKeyEvent,
    RequestScreen,
    ScreenData,
    StartScreenRecording,
    StopScreenRecording,
    RecordingStatus,
    RecordingChunk,
    RecordingComplete,
}

impl RelayKind {
    /// Every relay kind, in catalogue order.
    pub const ALL: [RelayKind; 15] = [
        RelayKind::Offer,
        RelayKind::Answer,
        RelayKind::IceCandidate,
        RelayKind::RemoteMouseMove,
        RelayKind::RemoteMouseClick,
        RelayKind::RemoteMouseScroll,
        RelayKind::RemoteKeyPress,
        RelayKind::RemoteKeyEvent,
        RelayKind::RequestScreen,
        RelayKind::ScreenData,
        RelayKind::StartScreenRecording,
        RelayKind::StopScreenRecording,
        RelayKind::RecordingStatus,
        RelayKind::RecordingChunk,
        RelayKind::RecordingComplete,
    ];

    /// The wire name of this kind.
    pub fn event_name(self) -> &'static str {
        match self {
            RelayKind::Offer => "offer",
            RelayKind::Answer => "answer",
            RelayKind::IceCandidate => "ice-candidate",
            RelayKind::RemoteMouseMove => "remote-mouse-move",
            RelayKind::RemoteMouseClick => "remote-mouse-click",
            RelayKind::RemoteMouseScroll => "remote-mouse-scroll",
            RelayKind::RemoteKeyPress => "remote-key-press",
            RelayKind::RemoteKeyEvent => "remote-key-event",
            RelayKind::RequestScreen => "request-screen",
            RelayKind::ScreenData => "screen-data",
            RelayKind::StartScreenRecording => "start-screen-recording",
            RelayKind::StopScreenRecording => "stop-screen-recording",
            RelayKind::RecordingStatus => "recording-status",
            RelayKind::RecordingChunk => "recording-chunk",
            RelayKind::RecordingComplete => "recording-complete",
        }
    }

    /// Looks up a relay kind by its wire name.
    pub fn from_event_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.event_name() == name)
    }

    /// `true` for the high-frequency input kinds.  Used to keep per-message
    /// debug logging quiet for mouse and keyboard traffic.
    pub fn is_input(self) -> bool {
        matches!(
            self,
            RelayKind::RemoteMouseMove
                | RelayKind::RemoteMouseClick
                | RelayKind::RemoteMouseScroll
                | RelayKind::RemoteKeyPress
                | RelayKind::RemoteKeyEvent
        )
    }
}

impl fmt::Display for RelayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// A relayed message: the kind, the addressee, and the untouched `data`
/// object (including its `to` field).
#[derive(Debug, Clone, PartialEq)]
pub struct RelayEnvelope {
    pub kind: RelayKind,
    pub to: ConnectionId,
    pub payload: Map<String, Value>,
}

// ── Inbound payloads ──────────────────────────────────────────────────────────

/// `host-ready`: a connection declares itself a host and asks for a code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostReady {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
}

/// `connect-with-code`: a controller asks to pair with whoever holds `code`.
///
/// `code` defaults to empty so a missing field is reported as a
/// `code-rejected` rather than a decode error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectWithCode {
    #[serde(default)]
    pub code: String,
}

/// `connection-response`: the host approves or rejects a pending controller.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResponse {
    pub client_id: ConnectionId,
    pub accepted: bool,
    /// Optional legacy password granted alongside an approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_password: Option<String>,
}

/// `set-permanent-access`: the host grants a durable credential.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPermanentAccess {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub password: String,
}

/// `connect-with-permanent-access`: a controller authenticates with a
/// durable credential instead of a code.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectWithPermanentAccess {
    #[serde(default)]
    pub machine_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub password: String,
}

/// `connect-with-password`: the older password-only pairing path.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectWithPassword {
    #[serde(default)]
    pub machine_id: String,
    #[serde(default)]
    pub password: String,
}

/// `fetch-permanent-access`: a controller lists the credentials it owns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchPermanentAccess {
    #[serde(default)]
    pub client_id: String,
}

/// `revoke-permanent-access`: a controller withdraws one of its own
/// credentials on a machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokePermanentAccess {
    #[serde(default)]
    pub machine_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub client_id: String,
}

/// `disconnect-client`: the host evicts one of its controllers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectClient {
    pub client_id: ConnectionId,
}

// Manual Debug impls keep passwords out of logs.

impl fmt::Debug for ConnectionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionResponse")
            .field("client_id", &self.client_id)
            .field("accepted", &self.accepted)
            .field("set_password", &self.set_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Debug for SetPermanentAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetPermanentAccess")
            .field("client_id", &self.client_id)
            .field("label", &self.label)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for ConnectWithPermanentAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectWithPermanentAccess")
            .field("machine_id", &self.machine_id)
            .field("label", &self.label)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for ConnectWithPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectWithPassword")
            .field("machine_id", &self.machine_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything a host or controller can send to the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    KeepAlive,
    HostReady(HostReady),
    ConnectWithCode(ConnectWithCode),
    ConnectionResponse(ConnectionResponse),
    SetPermanentAccess(SetPermanentAccess),
    ConnectWithPermanentAccess(ConnectWithPermanentAccess),
    ConnectWithPassword(ConnectWithPassword),
    FetchPermanentAccess(FetchPermanentAccess),
    RevokePermanentAccess(RevokePermanentAccess),
    DisconnectClient(DisconnectClient),
    Relay(RelayEnvelope),
}

impl InboundEvent {
    /// The wire name of this event.  Safe to log: carries no field values.
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::KeepAlive => "keep-alive",
            InboundEvent::HostReady(_) => "host-ready",
            InboundEvent::ConnectWithCode(_) => "connect-with-code",
            InboundEvent::ConnectionResponse(_) => "connection-response",
            InboundEvent::SetPermanentAccess(_) => "set-permanent-access",
            InboundEvent::ConnectWithPermanentAccess(_) => "connect-with-permanent-access",
            InboundEvent::ConnectWithPassword(_) => "connect-with-password",
            InboundEvent::FetchPermanentAccess(_) => "fetch-permanent-access",
            InboundEvent::RevokePermanentAccess(_) => "revoke-permanent-access",
            InboundEvent::DisconnectClient(_) => "disconnect-client",
            InboundEvent::Relay(envelope) => envelope.kind.event_name(),
        }
    }
}

// ── Outbound payloads ─────────────────────────────────────────────────────────

/// `session-code`: the code issued to a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCode {
    pub code: PairingCode,
}

/// `code-accepted`: the controller's code matched an active host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAccepted {
    pub host_id: ConnectionId,
    pub display_name: String,
}

/// `code-rejected`: the controller's code did not match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRejected {
    pub message: String,
}

/// `connection-request`: a controller is waiting for this host's approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub client_id: ConnectionId,
    /// Unix epoch milliseconds at which the request was queued.
    pub timestamp: i64,
}

/// `connection-accepted`: the controller is now paired with `host_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAccepted {
    pub host_id: ConnectionId,
    pub display_name: String,
    /// `true` when no interactive approval took place.
    #[serde(default)]
    pub automatic: bool,
    /// `true` when the pairing was authorised by a durable credential.
    #[serde(default)]
    pub permanent_access: bool,
}

/// `connection-rejected`: the host declined, or a password pairing failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRejected {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<ConnectionId>,
    pub message: String,
}

/// `permanent-access-response`: result of a host's grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermanentAccessResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `permanent-access-revoked`: result of a controller's revoke request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermanentAccessRevoked {
    pub success: bool,
    pub machine_id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `permanent-access-auth-response`: result of a controller's credential
/// authentication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermanentAccessAuthResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<ConnectionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One credential as shown to its owner.  Never carries the hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    pub label: String,
    pub owner_client_id: String,
    pub created_at: i64,
    pub last_used_at: i64,
}

/// One machine the controller holds credentials for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineAccess {
    pub machine_id: String,
    pub display_name: String,
    pub credentials: Vec<CredentialSummary>,
}

/// A grant that was queued for this connection since its last fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrantNotice {
    pub machine_id: String,
    pub display_name: String,
    pub label: String,
    pub granted_at: i64,
}

/// `permanent-access-data`: the controller's credential listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermanentAccessData {
    pub client_id: String,
    pub machines: Vec<MachineAccess>,
    #[serde(default)]
    pub granted: Vec<AccessGrantNotice>,
}

/// Why a controller lost its host.
///
/// On the wire this is a plain string: the transport's close reason, or
/// `"manual-disconnect"` for an eviction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DisconnectReason {
    /// The host's transport closed; `detail` is the transport's reason.
    TransportClosed(String),
    /// The host evicted this controller with `disconnect-client`.
    ManualDisconnect,
}

const MANUAL_DISCONNECT: &str = "manual-disconnect";

impl From<String> for DisconnectReason {
    fn from(reason: String) -> Self {
        if reason == MANUAL_DISCONNECT {
            DisconnectReason::ManualDisconnect
        } else {
            DisconnectReason::TransportClosed(reason)
        }
    }
}

impl From<DisconnectReason> for String {
    fn from(reason: DisconnectReason) -> Self {
        match reason {
            DisconnectReason::TransportClosed(detail) => detail,
            DisconnectReason::ManualDisconnect => MANUAL_DISCONNECT.to_string(),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::TransportClosed(detail) => write!(f, "transport closed: {detail}"),
            DisconnectReason::ManualDisconnect => f.write_str(MANUAL_DISCONNECT),
        }
    }
}

/// `host-disconnected`: the controller's host is gone (or evicted it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDisconnected {
    pub host_id: ConnectionId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
    pub reason: DisconnectReason,
}

/// How a controller paired without the host's interactive approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoConnectMethod {
    LegacyPassword,
    PermanentAccess,
}

/// `client-auto-connected`: tells a host a controller paired without approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAutoConnected {
    pub client_id: ConnectionId,
    pub method: AutoConnectMethod,
}

/// `error`: a request was malformed or referred to something absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotice {
    /// Wire name of the request that failed, or `"unknown"`.
    pub event: String,
    pub message: String,
}

/// Everything the broker can send to a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    SessionCode(SessionCode),
    CodeAccepted(CodeAccepted),
    CodeRejected(CodeRejected),
    ConnectionRequest(ConnectionRequest),
    ConnectionAccepted(ConnectionAccepted),
    ConnectionRejected(ConnectionRejected),
    PermanentAccessResponse(PermanentAccessResponse),
    PermanentAccessAuthResponse(PermanentAccessAuthResponse),
    PermanentAccessData(PermanentAccessData),
    PermanentAccessRevoked(PermanentAccessRevoked),
    HostDisconnected(HostDisconnected),
    ClientAutoConnected(ClientAutoConnected),
    Error(ErrorNotice),
    /// A forwarded relay payload with `from` injected.
    Relayed(RelayedMessage),
}

/// The outbound half of a relay: the payload as received plus `from`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayedMessage {
    pub kind: RelayKind,
    pub payload: Map<String, Value>,
}

impl OutboundEvent {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::SessionCode(_) => "session-code",
            OutboundEvent::CodeAccepted(_) => "code-accepted",
            OutboundEvent::CodeRejected(_) => "code-rejected",
            OutboundEvent::ConnectionRequest(_) => "connection-request",
            OutboundEvent::ConnectionAccepted(_) => "connection-accepted",
            OutboundEvent::ConnectionRejected(_) => "connection-rejected",
            OutboundEvent::PermanentAccessResponse(_) => "permanent-access-response",
            OutboundEvent::PermanentAccessAuthResponse(_) => "permanent-access-auth-response",
            OutboundEvent::PermanentAccessData(_) => "permanent-access-data",
            OutboundEvent::PermanentAccessRevoked(_) => "permanent-access-revoked",
            OutboundEvent::HostDisconnected(_) => "host-disconnected",
            OutboundEvent::ClientAutoConnected(_) => "client-auto-connected",
            OutboundEvent::Error(_) => "error",
            OutboundEvent::Relayed(m) => m.kind.event_name(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
