//! Infrastructure layer for the broker.
//!
//! Contains the file-system adapters behind the application's storage traits
//! and the start-up wiring that assembles a [`Broker`](crate::application::broker::Broker)
//! from a [`BrokerConfig`](storage::config::BrokerConfig).
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `deskrelay_core`, but MUST NOT be imported by the `application` layer
//! outside of tests.

pub mod bootstrap;
pub mod storage;
