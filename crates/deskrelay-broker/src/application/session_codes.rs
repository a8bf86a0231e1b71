//! Session code broker: pairing codes and pending approvals per host.
//!
//! # Pairing by code (for beginners)
//!
//! ```text
//! Host H                      Broker                         Controller C
//! ──────                      ──────                         ────────────
//! host-ready ───────────────► begin_host_session(H)
//!            ◄─────────────── session-code {482913}
//!                                                  ◄──────── connect-with-code {482913}
//!                             match_code → H
//!                             request_connection(H, C)
//!            ◄─────────────── connection-request {C}
//! connection-response ──────► resolve_connection(H, C, true)
//!                             (mapping C → H created)   ───► connection-accepted {H}
//! ```
//!
//! Codes are unique among *active* sessions only.  A code is released when its
//! host disconnects (or announces again) and may be issued to someone else.
//!
//! # Code generation
//!
//! Codes come from a [`CodeSource`].  Production uses [`RandomCodeSource`];
//! tests inject a fixed sequence to provoke collisions deterministically.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use deskrelay_core::protocol::messages::DEFAULT_DISPLAY_NAME;
use deskrelay_core::{ConnectionId, PairingCode};
use tracing::debug;

use crate::application::error::BrokerError;

/// Samples drawn before giving up on finding an unused code.
pub const MAX_CODE_ATTEMPTS: u32 = 64;

/// Supplies candidate pairing codes.
pub trait CodeSource: Send {
    fn next_code(&mut self) -> PairingCode;
}

/// Uniform random codes from the thread-local RNG.
#[derive(Debug, Default)]
pub struct RandomCodeSource;

impl CodeSource for RandomCodeSource {
    fn next_code(&mut self) -> PairingCode {
        PairingCode::random(&mut rand::rng())
    }
}

/// Replays a fixed list of codes, then falls back to random ones.
#[derive(Debug, Default)]
pub struct FixedCodeSource {
    queue: VecDeque<PairingCode>,
}

impl FixedCodeSource {
    pub fn new(codes: impl IntoIterator<Item = PairingCode>) -> Self {
        Self {
            queue: codes.into_iter().collect(),
        }
    }
}

impl CodeSource for FixedCodeSource {
    fn next_code(&mut self) -> PairingCode {
        self.queue
            .pop_front()
            .unwrap_or_else(|| PairingCode::random(&mut rand::rng()))
    }
}

/// Approval state of a pending controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    Pending,
    Accepted,
}

/// A controller waiting for a host's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConnection {
    pub requested_at: DateTime<Utc>,
    pub status: PendingStatus,
}

/// State owned by one host connection.
#[derive(Debug, Clone)]
pub struct HostSession {
    pub host_id: ConnectionId,
    pub code: PairingCode,
    pub display_name: String,
    pub machine_id: Option<String>,
    pub pending: HashMap<ConnectionId, PendingConnection>,
}

/// Outcome of [`SessionCodeBroker::resolve_connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The entry was approved and removed; the caller creates the mapping.
    Accepted(PendingConnection),
    /// The entry was declined and removed.
    Rejected,
    /// No such pending entry (already resolved, or never requested).
    NoOp,
}

/// Table of active host sessions keyed by host connection id.
pub struct SessionCodeBroker {
    sessions: HashMap<ConnectionId, HostSession>,
    codes: Box<dyn CodeSource>,
}

impl Default for SessionCodeBroker {
    fn default() -> Self {
        Self::new(Box::new(RandomCodeSource))
    }
}

impl SessionCodeBroker {
    pub fn new(codes: Box<dyn CodeSource>) -> Self {
        Self {
            sessions: HashMap::new(),
            codes,
        }
    }

    /// Starts (or restarts) `host_id`'s session and returns its new code.
    ///
    /// A repeated call replaces the previous session: the old code is
    /// released and pending requests are discarded.  Candidate codes already
    /// held by *another* active host are resampled.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::CodesExhausted`] when [`MAX_CODE_ATTEMPTS`]
    /// samples all collided.
    pub fn begin_host_session(
        &mut self,
        host_id: ConnectionId,
        display_name: Option<String>,
        machine_id: Option<String>,
    ) -> Result<PairingCode, BrokerError> {
        self.sessions.remove(&host_id);

        let mut attempts = 0;
        let code = loop {
            if attempts == MAX_CODE_ATTEMPTS {
                return Err(BrokerError::CodesExhausted(MAX_CODE_ATTEMPTS));
            }
            attempts += 1;
            let candidate = self.codes.next_code();
            if self.match_code(&candidate).is_none() {
                break candidate;
            }
            debug!("pairing code collision, resampling (attempt {attempts})");
        };

        let display_name = display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());
        let machine_id = machine_id.filter(|id| !id.trim().is_empty());

        self.sessions.insert(
            host_id,
            HostSession {
                host_id,
                code: code.clone(),
                display_name,
                machine_id,
                pending: HashMap::new(),
            },
        );
        Ok(code)
    }

    /// Finds the host holding `code` by linear scan.
    pub fn match_code(&self, code: &PairingCode) -> Option<ConnectionId> {
        self.sessions
            .values()
            .find(|session| &session.code == code)
            .map(|session| session.host_id)
    }

    /// Finds the active host announcing `machine_id`.
    pub fn host_for_machine(&self, machine_id: &str) -> Option<&HostSession> {
        self.sessions
            .values()
            .find(|session| session.machine_id.as_deref() == Some(machine_id))
    }

    pub fn session(&self, host_id: ConnectionId) -> Option<&HostSession> {
        self.sessions.get(&host_id)
    }

    pub fn is_active(&self, host_id: ConnectionId) -> bool {
        self.sessions.contains_key(&host_id)
    }

    /// Ends `host_id`'s session, releasing its code.
    pub fn end_session(&mut self, host_id: ConnectionId) -> Option<HostSession> {
        self.sessions.remove(&host_id)
    }

    /// Queues `requester` for `host_id`'s approval.
    ///
    /// Returns `false`, and does nothing, when the host has no active session.
    /// A repeated request refreshes the timestamp.
    pub fn request_connection(
        &mut self,
        host_id: ConnectionId,
        requester: ConnectionId,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(session) = self.sessions.get_mut(&host_id) else {
            return false;
        };
        session.pending.insert(
            requester,
            PendingConnection {
                requested_at: now,
                status: PendingStatus::Pending,
            },
        );
        true
    }

    /// Applies the host's decision on `requester`.
    ///
    /// Idempotent: once the entry is gone, further calls return
    /// [`Resolution::NoOp`].
    pub fn resolve_connection(
        &mut self,
        host_id: ConnectionId,
        requester: ConnectionId,
        accepted: bool,
    ) -> Resolution {
        let Some(session) = self.sessions.get_mut(&host_id) else {
            return Resolution::NoOp;
        };
        let Some(mut entry) = session.pending.remove(&requester) else {
            return Resolution::NoOp;
        };
        if accepted {
            entry.status = PendingStatus::Accepted;
            Resolution::Accepted(entry)
        } else {
            Resolution::Rejected
        }
    }

    /// Removes `requester` from every host's pending list.
    pub fn remove_requester(&mut self, requester: ConnectionId) -> usize {
        let mut removed = 0;
        for session in self.sessions.values_mut() {
            if session.pending.remove(&requester).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Number of active host sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
