//! Reaper: periodic removal of stale client→host mappings.
//!
//! Disconnect events can be missed (a proxy that never forwards the close, a
//! process killed mid-write).  Every `interval` the reaper deletes each
//! mapping created more than `ttl` ago, whether or not it was used since.
//! This is unrelated to a credential's `lastUsedAt`.
//!
//! Reaping a mapping does not stop relaying between the two connections;
//! relay only requires the recipient to be connected.

use std::sync::Arc;
use std::time::{Duration, Instant};

use deskrelay_core::ConnectionId;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::application::broker::Broker;
use crate::application::registry::ConnectionRegistry;

/// Sweep interval in the reference deployment.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Mapping age after which a sweep deletes it.
pub const DEFAULT_MAPPING_TTL: Duration = Duration::from_secs(60 * 60);

/// Deletes every mapping older than `ttl` at `now`; returns the affected
/// clients.
pub fn sweep(registry: &mut ConnectionRegistry, now: Instant, ttl: Duration) -> Vec<ConnectionId> {
    registry.expire_mappings(now, ttl)
}

/// Runs one sweep against the broker's registry.
pub async fn reap_once(broker: &Broker, ttl: Duration) -> usize {
    let expired = sweep(&mut *broker.registry.lock().await, Instant::now(), ttl);
    if !expired.is_empty() {
        info!("reaper removed {} stale mapping(s)", expired.len());
    }
    expired.len()
}

/// Spawns the periodic sweep.  The task runs until aborted through the
/// returned handle.
pub fn spawn_reaper(broker: Arc<Broker>, every: Duration, ttl: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        debug!("reaper started (every {every:?}, ttl {ttl:?})");

        loop {
            ticker.tick().await;
            reap_once(&broker, ttl).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::PairingMethod;

    fn paired(created: Instant) -> (ConnectionRegistry, ConnectionId) {
        let mut registry = ConnectionRegistry::new();
        let (client, host) = (ConnectionId::new(), ConnectionId::new());
        registry.register(client, created);
        registry.register(host, created);
        registry.pair(client, host, PairingMethod::Code, created);
        (registry, client)
    }

    #[test]
    fn test_sweep_at_61_minutes_deletes_mapping() {
        // Arrange
        let created = Instant::now();
        let (mut registry, client) = paired(created);

        // Act
        let expired = sweep(
            &mut registry,
            created + Duration::from_secs(61 * 60),
            DEFAULT_MAPPING_TTL,
        );

        // Assert
        assert_eq!(expired, vec![client]);
        assert!(registry.mapping(client).is_none());
    }

    #[test]
    fn test_sweep_at_59_minutes_keeps_mapping() {
        let created = Instant::now();
        let (mut registry, client) = paired(created);

        let expired = sweep(
            &mut registry,
            created + Duration::from_secs(59 * 60),
            DEFAULT_MAPPING_TTL,
        );

        assert!(expired.is_empty());
        assert!(registry.mapping(client).is_some());
    }

    #[test]
    fn test_sweep_keeps_connection_registered() {
        let created = Instant::now();
        let (mut registry, client) = paired(created);

        sweep(&mut registry, created + Duration::from_secs(2 * 3600), DEFAULT_MAPPING_TTL);

        assert!(registry.is_connected(client));
    }

    #[test]
    fn test_defaults_match_reference_deployment() {
        assert_eq!(DEFAULT_REAP_INTERVAL, Duration::from_secs(300));
        assert_eq!(DEFAULT_MAPPING_TTL, Duration::from_secs(3600));
    }
}
