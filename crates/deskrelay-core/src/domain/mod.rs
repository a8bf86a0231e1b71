//! Domain identifiers for DeskRelay.
//!
//! This module contains pure value types with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of a Clean Architecture codebase is the **domain**.
//! Domain code has no imports from network libraries, databases, or async
//! runtimes, so it can be compiled and tested anywhere without setup.
//!
//! For the broker the domain is small: the identity of a live connection and
//! the short numeric code a host shows to its user.  Everything stateful (who
//! is paired with whom) lives in the broker crate's application layer.

/// Six digit pairing codes.
pub mod code;

/// Transport-assigned connection identifiers.
pub mod ids;
