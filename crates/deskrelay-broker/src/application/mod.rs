//! Application layer: the connection broker's state and rules.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure types in `deskrelay_core`) and the infrastructure (sockets, files).
//! Code here:
//!
//! - **Orchestrates** the broker tables to fulfil one inbound request.
//! - **Depends on abstractions** ([`delivery::Outbound`],
//!   [`credentials::DocumentStore`], [`legacy_trust::TrustFile`]) rather than
//!   concrete sockets and files.
//! - **Contains no network I/O**.
//!
//! # Sub-modules
//!
//! - **`broker`**         – Shared state, lock order and the connect / handle /
//!   disconnect entry points.
//! - **`dispatch`**       – One handler per inbound event and the mapping from
//!   errors to rejection replies.
//! - **`registry`**       – Live connections, their roles and client→host
//!   mappings.
//! - **`session_codes`**  – Host sessions, 6-digit pairing codes and pending
//!   approvals.
//! - **`relay`**          – Opaque forwarding of signaling and input messages.
//! - **`disconnect`**     – The disconnect cascade and host-initiated eviction.
//! - **`reaper`**         – Periodic deletion of stale mappings.
//! - **`credentials`**    – Durable machine-scoped permanent access.
//! - **`legacy_trust`**   – The older password-only trust table.
//! - **`notifications`**  – Per-connection mailbox of grant notices.
//! - **`delivery`**       – The outbound seam to the transport.
//! - **`persistence`**    – Store errors and the durability policy.
//! - **`error`**          – The handler error taxonomy.

pub mod broker;
pub mod credentials;
pub mod delivery;
pub mod disconnect;
pub mod dispatch;
pub mod error;
pub mod legacy_trust;
pub mod notifications;
pub mod persistence;
pub mod reaper;
pub mod registry;
pub mod relay;
pub mod session_codes;
