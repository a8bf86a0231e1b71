//! Per-connection mailbox for permanent-access grant notices.
//!
//! When a host grants a credential to a controller that is currently
//! connected, the broker queues an [`AccessGrantNotice`] for it.  The notice is
//! handed over the next time that connection sends `fetch-permanent-access`,
//! and discarded if the connection goes away first.  Nothing here is
//! persisted.

use std::collections::HashMap;

use deskrelay_core::protocol::messages::AccessGrantNotice;
use deskrelay_core::ConnectionId;

#[derive(Debug, Default)]
pub struct NotificationQueue {
    mailboxes: HashMap<ConnectionId, Vec<AccessGrantNotice>>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `notice` for `to`.
    pub fn push(&mut self, to: ConnectionId, notice: AccessGrantNotice) {
        self.mailboxes.entry(to).or_default().push(notice);
    }

    /// Hands over and forgets everything queued for `id`, oldest first.
    pub fn drain(&mut self, id: ConnectionId) -> Vec<AccessGrantNotice> {
        self.mailboxes.remove(&id).unwrap_or_default()
    }

    /// Drops `id`'s mailbox; returns how many notices were discarded.
    pub fn discard(&mut self, id: ConnectionId) -> usize {
        self.mailboxes.remove(&id).map_or(0, |notices| notices.len())
    }

    /// Number of notices queued for `id`.
    pub fn pending_for(&self, id: ConnectionId) -> usize {
        self.mailboxes.get(&id).map_or(0, Vec::len)
    }
}
