//! Outbound delivery seam.
//!
//! The broker decides *what* to send and *to whom*; the transport decides
//! *how*.  [`Outbound`] is the only thing the broker needs from the
//! transport, which keeps every handler testable without sockets.

use async_trait::async_trait;
use deskrelay_core::{ConnectionId, OutboundEvent};
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::broker::Delivery;

/// Why one delivery could not be queued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The connection closed before the event could be queued.
    #[error("connection {0} is gone")]
    Gone(ConnectionId),

    /// The connection's outbound queue is full.
    #[error("outbound queue for {0} is full")]
    QueueFull(ConnectionId),
}

/// Sends events to live connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn deliver(&self, to: ConnectionId, event: OutboundEvent) -> Result<(), DeliveryError>;
}

/// Sends every delivery in order.  Failures are logged and skipped: an
/// undeliverable event is dropped, never retried.
///
/// Returns how many deliveries were queued.
pub async fn deliver_all(outbound: &dyn Outbound, deliveries: Vec<Delivery>) -> usize {
    let mut sent = 0;
    for Delivery { to, event } in deliveries {
        let name = event.name();
        match outbound.deliver(to, event).await {
            Ok(()) => {
                sent += 1;
                debug!("→ {to}: {name}");
            }
            Err(e) => warn!("dropping {name}: {e}"),
        }
    }
    sent
}
