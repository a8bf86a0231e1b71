//! Frame handling for one connection: text in, deliveries out.
//!
//! The WebSocket layer hands every text frame to [`process_text_frame`] and
//! sends whatever comes back.  Keeping this step free of sockets means the
//! whole request path (decode, dispatch, error reply) is testable with a
//! plain in-memory broker.

use deskrelay_broker::{Broker, Delivery};
use deskrelay_core::protocol::messages::ErrorNotice;
use deskrelay_core::{decode_inbound, encode_outbound, ConnectionId, OutboundEvent};
use tracing::{error, warn};

/// Event name reported when a frame is too broken to name its event.
pub const UNKNOWN_EVENT: &str = "unknown";

/// Decodes one text frame from `sender` and runs it through the broker.
///
/// A frame that does not decode is answered with an `error` event addressed
/// to the sender only; the connection stays open.
pub async fn process_text_frame(broker: &Broker, sender: ConnectionId, text: &str) -> Vec<Delivery> {
    match decode_inbound(text) {
        Ok(event) => broker.handle(sender, event).await,
        Err(e) => {
            let event = e.event().unwrap_or(UNKNOWN_EVENT).to_string();
            warn!("{sender}: undecodable frame ({event}): {e}");
            vec![Delivery::new(
                sender,
                OutboundEvent::Error(ErrorNotice {
                    event,
                    message: e.to_string(),
                }),
            )]
        }
    }
}

/// Encodes an outbound event into a text frame, logging and returning `None`
/// if that fails.
pub fn encode_frame(event: &OutboundEvent) -> Option<String> {
    match encode_outbound(event) {
        Ok(text) => Some(text),
        Err(e) => {
            error!("dropping {}: {e}", event.name());
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
