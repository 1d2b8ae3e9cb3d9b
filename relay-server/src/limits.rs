//! Rate limiting for sealed-relay.
//!
//! Three limiters, all from the governor crate:
//! - connection attempts per peer IP (keyed)
//! - frames per connection (keyed by [`ConnectionId`])
//! - frames across the whole server (direct)
//!
//! Keyed state lives in DashMaps and is trimmed by [`RateLimits::shrink`]
//! from the maintenance task.

use crate::config::LimitsConfig;
use crate::session::ConnectionId;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Zero is treated as one; a limit of zero would lock everyone out.
fn nonzero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

/// Rate limiters for the relay server.
#[derive(Clone)]
pub struct RateLimits {
    /// `limits.connections_per_ip` per minute.
    connection_limiter: Arc<KeyedLimiter<IpAddr>>,
    /// `limits.messages_per_minute` per connection.
    message_limiter: Arc<KeyedLimiter<u64>>,
    /// `limits.global_requests_per_second` across all connections.
    global_limiter: Arc<DirectLimiter>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("connection_keys", &self.connection_limiter.len())
            .field("message_keys", &self.message_limiter.len())
            .finish_non_exhaustive()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    pub fn new(config: &LimitsConfig) -> Self {
        let connection_quota = Quota::per_minute(nonzero(config.connections_per_ip));
        let message_quota = Quota::per_minute(nonzero(config.messages_per_minute));
        let global_quota = Quota::per_second(nonzero(config.global_requests_per_second));

        Self {
            connection_limiter: Arc::new(RateLimiter::keyed(connection_quota)),
            message_limiter: Arc::new(RateLimiter::keyed(message_quota)),
            global_limiter: Arc::new(RateLimiter::direct(global_quota)),
        }
    }

    /// Check if a connection attempt from `ip` is allowed.
    pub fn check_connection(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        self.connection_limiter
            .check_key(&ip)
            .map_err(|_| RateLimitError::ConnectionLimitExceeded)
    }

    /// Check if `connection` may send another frame.
    pub fn check_message(&self, connection: ConnectionId) -> Result<(), RateLimitError> {
        self.message_limiter
            .check_key(&connection.get())
            .map_err(|_| RateLimitError::MessageLimitExceeded)
    }

    /// Check the server-wide request rate.
    pub fn check_global(&self) -> Result<(), RateLimitError> {
        self.global_limiter
            .check()
            .map_err(|_| RateLimitError::GlobalLimitExceeded)
    }

    /// Global then per-connection check for one inbound frame.
    pub fn check_frame(&self, connection: ConnectionId) -> Result<(), RateLimitError> {
        self.check_global()?;
        self.check_message(connection)
    }

    /// Tracked connection keys (for metrics).
    pub fn connection_keys_count(&self) -> usize {
        self.connection_limiter.len()
    }

    /// Tracked message keys (for metrics).
    pub fn message_keys_count(&self) -> usize {
        self.message_limiter.len()
    }

    /// Evict keys whose cells have fully recharged.
    pub fn shrink(&self) {
        self.connection_limiter.retain_recent();
        self.message_limiter.retain_recent();
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// Too many connection attempts from this IP.
    ConnectionLimitExceeded,
    /// Too many frames on this connection.
    MessageLimitExceeded,
    /// Global request rate exceeded.
    GlobalLimitExceeded,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLimitExceeded => write!(f, "connection rate limit exceeded"),
            Self::MessageLimitExceeded => write!(f, "message rate limit exceeded"),
            Self::GlobalLimitExceeded => write!(f, "global rate limit exceeded"),
        }
    }
}

impl std::error::Error for RateLimitError {}
