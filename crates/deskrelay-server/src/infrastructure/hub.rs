//! Connection hub: one outbound queue per live connection.
//!
//! Each connection task registers a bounded `mpsc` sender here on accept.
//! The broker's deliveries are pushed into the addressee's queue, and that
//! connection's writer task drains the queue onto its socket.  Pushing never
//! waits: a full queue drops the event, so one slow reader cannot stall the
//! connections that are sending to it.
//!
//! # Why a queue per connection? (for beginners)
//!
//! A WebSocket sink can only be written by one task at a time.  Rather than
//! share the sink behind a lock, every connection owns its sink in a single
//! writer task and everyone else talks to that task through a channel.  The
//! channel is FIFO, which is what keeps relayed messages between two parties
//! in order.

use std::collections::HashMap;

use async_trait::async_trait;
use deskrelay_broker::{DeliveryError, Outbound};
use deskrelay_core::{ConnectionId, OutboundEvent};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;

/// Outbound queues keyed by connection.
#[derive(Default)]
pub struct ConnectionHub {
    queues: RwLock<HashMap<ConnectionId, mpsc::Sender<OutboundEvent>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers `id`'s queue, returning the receiving end for
    /// its writer task.
    pub async fn register(&self, id: ConnectionId, capacity: usize) -> mpsc::Receiver<OutboundEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.queues.write().await.insert(id, tx);
        rx
    }

    /// Removes `id`'s queue.  Events addressed to it afterwards are dropped.
    pub async fn unregister(&self, id: ConnectionId) {
        self.queues.write().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.queues.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queues.read().await.is_empty()
    }
}

#[async_trait]
impl Outbound for ConnectionHub {
    async fn deliver(&self, to: ConnectionId, event: OutboundEvent) -> Result<(), DeliveryError> {
        let queues = self.queues.read().await;
        let queue = queues.get(&to).ok_or(DeliveryError::Gone(to))?;
        queue.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull(to),
            TrySendError::Closed(_) => DeliveryError::Gone(to),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
