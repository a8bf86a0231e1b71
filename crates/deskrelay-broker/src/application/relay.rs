//! Relay engine: forwards opaque payloads between two connections.
//!
//! The broker never looks inside a relayed payload.  It checks that the
//! addressee is a live connection paired with the sender, stamps `from` with
//! the sender's id (overwriting anything the sender put there), and hands the
//! result to the delivery layer.  Nothing is buffered: a message for a
//! vanished or unpaired connection is dropped.
//!
//! Ordering within one sender → recipient stream is preserved because each
//! connection's frames are handled in arrival order and deliveries go through
//! a per-recipient FIFO queue.
//!
//! The pairing check uses the registry's links, not its mappings.  Mappings
//! are reaped by age, and a long-running session must keep relaying after
//! its mapping expires.

use deskrelay_core::protocol::messages::{OutboundEvent, RelayEnvelope, RelayedMessage};
use deskrelay_core::ConnectionId;
use serde_json::Value;

use crate::application::broker::Delivery;
use crate::application::error::BrokerError;
use crate::application::registry::ConnectionRegistry;

/// Builds the delivery for one relayed message.
///
/// # Errors
///
/// - [`BrokerError::RecipientUnavailable`] when `envelope.to` is not
///   registered.
/// - [`BrokerError::NotPaired`] when the host never approved a pairing
///   between `sender` and `envelope.to`.
pub fn route(
    registry: &ConnectionRegistry,
    sender: ConnectionId,
    envelope: RelayEnvelope,
) -> Result<Delivery, BrokerError> {
    if !registry.is_connected(envelope.to) {
        return Err(BrokerError::RecipientUnavailable(envelope.to));
    }
    if !registry.are_linked(sender, envelope.to) {
        return Err(BrokerError::NotPaired {
            from: sender,
            to: envelope.to,
        });
    }

    let RelayEnvelope {
        kind,
        to,
        mut payload,
    } = envelope;
    payload.insert("from".to_string(), Value::String(sender.to_string()));

    Ok(Delivery {
        to,
        event: OutboundEvent::Relayed(RelayedMessage { kind, payload }),
    })
}
