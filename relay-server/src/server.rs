//! Shared relay context.
//!
//! One [`SealedRelay`] is built at startup and handed to every connection
//! task as an `Arc`. It owns the credential store, session table, protection
//! unit, data source, rate limiters, and metrics.

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::limits::RateLimits;
use crate::session::SessionTable;
use crate::source::DataSource;
use relay_crypto::ProtectionUnit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Operational counters. Monotonic until restart.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Connections accepted past rate limiting and the session cap.
    pub connections_total: AtomicU64,
    /// Successful authentications.
    pub auth_success_total: AtomicU64,
    /// Rejected authentications.
    pub auth_failures_total: AtomicU64,
    /// Protected values issued.
    pub values_issued_total: AtomicU64,
    /// Values transcoded for a recipient key.
    pub transcodes_total: AtomicU64,
    /// Public keys registered.
    pub keys_registered_total: AtomicU64,
    /// Rate limit rejections (connection, message, and global).
    pub rate_limit_hits: AtomicU64,
    /// Error responses sent.
    pub errors_total: AtomicU64,
}

/// Main relay context.
pub struct SealedRelay {
    config: Config,
    store: Arc<CredentialStore>,
    sessions: SessionTable,
    protection: ProtectionUnit,
    source: Arc<dyn DataSource>,
    rate_limits: RateLimits,
    metrics: RelayMetrics,
    live_connections: AtomicUsize,
}

impl std::fmt::Debug for SealedRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedRelay")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .field("sessions", &self.sessions.len())
            .field("connections", &self.active_connections())
            .finish_non_exhaustive()
    }
}

impl SealedRelay {
    /// Create a relay around a loaded store and a data source.
    pub fn new(config: Config, store: CredentialStore, source: Arc<dyn DataSource>) -> Self {
        let rate_limits = RateLimits::new(&config.limits);
        let protection = ProtectionUnit::new(store.symmetric_key());
        Self {
            config,
            store: Arc::new(store),
            sessions: SessionTable::new(),
            protection,
            source,
            rate_limits,
            metrics: RelayMetrics::default(),
            live_connections: AtomicUsize::new(0),
        }
    }

    /// Relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Credential store.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Session table.
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Protection unit under the server-wide key.
    pub fn protection(&self) -> &ProtectionUnit {
        &self.protection
    }

    /// External data source.
    pub fn source(&self) -> &dyn DataSource {
        self.source.as_ref()
    }

    /// Rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Live connections, authenticated or not.
    pub fn active_connections(&self) -> usize {
        self.live_connections.load(Ordering::Relaxed)
    }

    /// Claim a connection slot, or `None` at `limits.max_concurrent_sessions`.
    ///
    /// The slot is released when the guard drops.
    pub fn try_acquire_connection(self: &Arc<Self>) -> Option<ConnectionGuard> {
        let max = self.config.limits.max_concurrent_sessions;
        self.live_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < max).then_some(live + 1)
            })
            .ok()?;
        Some(ConnectionGuard {
            relay: Arc::clone(self),
        })
    }
}

/// Holds one connection slot.
#[derive(Debug)]
pub struct ConnectionGuard {
    relay: Arc<SealedRelay>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.relay.live_connections.fetch_sub(1, Ordering::AcqRel);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn connection_slots_respect_cap() {
        let mut config = Config::default();
        config.limits.max_concurrent_sessions = 2;
        let (_dir, relay) = relay_with(config, None);

        let a = relay.try_acquire_connection().unwrap();
        let _b = relay.try_acquire_connection().unwrap();
        assert!(relay.try_acquire_connection().is_none());
        assert_eq!(relay.active_connections(), 2);

        drop(a);
        assert_eq!(relay.active_connections(), 1);
        assert!(relay.try_acquire_connection().is_some());
    }

    #[test]
    fn protection_uses_store_key() {
        let (_dir, relay) = test_relay();
        let bundle = relay.protection().protect(b"value").unwrap();

        let unit = ProtectionUnit::new(relay.store().symmetric_key());
        assert_eq!(unit.unprotect(bundle.as_str()).unwrap().as_slice(), b"value");
    }

    #[test]
    fn debug_does_not_leak_key() {
        let (_dir, relay) = test_relay();
        let debug = format!("{relay:?}");
        assert!(debug.contains("SealedRelay"));
        assert!(!debug.contains(relay.store().symmetric_key().to_hex().as_str()));
    }

    #[tokio::test]
    async fn static_source_fails_when_empty() {
        let (_dir, relay) = relay_with(Config::default(), None);
        assert!(relay.source().fetch().await.is_err());
    }
}
