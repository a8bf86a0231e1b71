//! JSON frame codec for the DeskRelay signaling catalogue.
//!
//! Wire format (one WebSocket text frame per event):
//! ```text
//! {"event": "<kebab-case name>", "data": { <camelCase fields> }}
//! ```
//! `data` may be omitted or `null` for events without fields (`keep-alive`,
//! a bare `host-ready`).
//!
//! Decoding is two-step: the frame is first read as a loose envelope, then
//! `data` is deserialized into the payload type selected by `event`.  This
//! keeps error messages specific ("invalid payload for connection-response:
//! missing field `clientId`") and lets relay events keep their payload as an
//! untyped JSON object.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::ids::ConnectionId;
use crate::protocol::messages::{InboundEvent, OutboundEvent, RelayEnvelope, RelayKind};

/// Errors that can occur while decoding or encoding a frame.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The frame is not a JSON object at all.
    #[error("frame is not valid JSON: {0}")]
    MalformedJson(String),

    /// The frame has no `event` discriminant.
    #[error("frame has no \"event\" field")]
    MissingEvent,

    /// The `event` name is not in the catalogue.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// The `data` object does not fit the event's payload shape.
    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload { event: String, reason: String },

    /// An outbound event could not be serialized.
    #[error("failed to encode {event}: {reason}")]
    Encode { event: &'static str, reason: String },
}

impl ProtocolError {
    /// The wire name of the event the error concerns, when known.
    pub fn event(&self) -> Option<&str> {
        match self {
            ProtocolError::UnknownEvent(name) => Some(name),
            ProtocolError::InvalidPayload { event, .. } => Some(event),
            ProtocolError::Encode { event, .. } => Some(event),
            ProtocolError::MalformedJson(_) | ProtocolError::MissingEvent => None,
        }
    }
}

#[derive(Deserialize)]
struct RawFrame {
    event: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Serialize)]
struct Frame<'a, T: Serialize + ?Sized> {
    event: &'a str,
    data: &'a T,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one text frame into an [`InboundEvent`].
///
/// # Errors
///
/// Returns [`ProtocolError`] when the text is not JSON, names no or an unknown
/// event, or carries a payload of the wrong shape.
///
/// # Examples
///
/// ```rust
/// use deskrelay_core::protocol::codec::decode_inbound;
/// use deskrelay_core::protocol::messages::InboundEvent;
///
/// let event = decode_inbound(r#"{"event":"connect-with-code","data":{"code":"482913"}}"#).unwrap();
/// assert!(matches!(event, InboundEvent::ConnectWithCode(ref m) if m.code == "482913"));
/// ```
pub fn decode_inbound(text: &str) -> Result<InboundEvent, ProtocolError> {
    let raw: RawFrame =
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
    let event = raw.event.ok_or(ProtocolError::MissingEvent)?;
    let data = match raw.data {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };

    match event.as_str() {
        "keep-alive" => Ok(InboundEvent::KeepAlive),
        "host-ready" => payload(&event, data).map(InboundEvent::HostReady),
        "connect-with-code" => payload(&event, data).map(InboundEvent::ConnectWithCode),
        "connection-response" => payload(&event, data).map(InboundEvent::ConnectionResponse),
        "set-permanent-access" => payload(&event, data).map(InboundEvent::SetPermanentAccess),
        "connect-with-permanent-access" => {
            payload(&event, data).map(InboundEvent::ConnectWithPermanentAccess)
        }
        "connect-with-password" => payload(&event, data).map(InboundEvent::ConnectWithPassword),
        "fetch-permanent-access" => payload(&event, data).map(InboundEvent::FetchPermanentAccess),
        "revoke-permanent-access" => payload(&event, data).map(InboundEvent::RevokePermanentAccess),
        "disconnect-client" => payload(&event, data).map(InboundEvent::DisconnectClient),
        other => match RelayKind::from_event_name(other) {
            Some(kind) => decode_relay(kind, data).map(InboundEvent::Relay),
            None => Err(ProtocolError::UnknownEvent(event)),
        },
    }
}

/// Encodes an [`OutboundEvent`] into one text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails, which for these
/// plain data types only happens on non-string map keys inside a relayed
/// payload (impossible for payloads that came from JSON).
pub fn encode_outbound(event: &OutboundEvent) -> Result<String, ProtocolError> {
    let name = event.name();
    let result = match event {
        OutboundEvent::SessionCode(m) => frame(name, m),
        OutboundEvent::CodeAccepted(m) => frame(name, m),
        OutboundEvent::CodeRejected(m) => frame(name, m),
        OutboundEvent::ConnectionRequest(m) => frame(name, m),
        OutboundEvent::ConnectionAccepted(m) => frame(name, m),
        OutboundEvent::ConnectionRejected(m) => frame(name, m),
        OutboundEvent::PermanentAccessResponse(m) => frame(name, m),
        OutboundEvent::PermanentAccessAuthResponse(m) => frame(name, m),
        OutboundEvent::PermanentAccessData(m) => frame(name, m),
        OutboundEvent::PermanentAccessRevoked(m) => frame(name, m),
        OutboundEvent::HostDisconnected(m) => frame(name, m),
        OutboundEvent::ClientAutoConnected(m) => frame(name, m),
        OutboundEvent::Error(m) => frame(name, m),
        OutboundEvent::Relayed(m) => frame(name, &m.payload),
    };
    result.map_err(|e| ProtocolError::Encode {
        event: name,
        reason: e.to_string(),
    })
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn frame<T: Serialize + ?Sized>(event: &str, data: &T) -> serde_json::Result<String> {
    serde_json::to_string(&Frame { event, data })
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

/// Extracts the addressee of a relay event, keeping the full `data` object.
fn decode_relay(kind: RelayKind, data: Value) -> Result<RelayEnvelope, ProtocolError> {
    let invalid = |reason: &str| ProtocolError::InvalidPayload {
        event: kind.event_name().to_string(),
        reason: reason.to_string(),
    };

    let Value::Object(payload) = data else {
        return Err(invalid("data must be an object"));
    };
    let to = payload
        .get("to")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing field `to`"))?
        .parse::<ConnectionId>()
        .map_err(|_| invalid("`to` is not a connection id"))?;

    Ok(RelayEnvelope { kind, to, payload })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
