//! Health check endpoint.

use crate::server::SealedRelay;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Global start time for uptime calculation.
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call once at startup).
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Authenticated sessions.
    pub sessions: usize,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Health check handler.
pub async fn health_handler(Extension(relay): Extension<Arc<SealedRelay>>) -> Json<HealthStatus> {
    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: relay.sessions().len(),
        connections: relay.active_connections(),
        uptime_seconds: uptime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testing::test_relay;

    #[test]
    fn health_status_serializes() {
        let status = HealthStatus {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            sessions: 2,
            connections: 3,
            uptime_seconds: 3600,
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"sessions\":2"));
        assert!(json.contains("\"connections\":3"));
    }

    #[tokio::test]
    async fn handler_reports_live_counts() {
        let (_dir, relay) = test_relay();
        let _slot = relay.try_acquire_connection().unwrap();

        let Json(status) = health_handler(Extension(relay)).await;
        assert_eq!(status.status, "ok");
        assert_eq!(status.connections, 1);
        assert_eq!(status.sessions, 0);
    }
}
