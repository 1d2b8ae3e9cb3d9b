//! Prometheus metrics endpoint.

use crate::server::SealedRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
pub async fn metrics_handler(Extension(relay): Extension<Arc<SealedRelay>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        render(&relay),
    )
}

/// Render all gauges and counters in Prometheus text format.
fn render(relay: &SealedRelay) -> String {
    let m = relay.metrics();

    // Gauges
    let connections = relay.active_connections();
    let sessions = relay.sessions().len();

    // Counters
    let conns_total = m.connections_total.load(Ordering::Relaxed);
    let auth_ok = m.auth_success_total.load(Ordering::Relaxed);
    let auth_failed = m.auth_failures_total.load(Ordering::Relaxed);
    let values = m.values_issued_total.load(Ordering::Relaxed);
    let transcodes = m.transcodes_total.load(Ordering::Relaxed);
    let keys = m.keys_registered_total.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);
    let errors = m.errors_total.load(Ordering::Relaxed);

    format!(
        r#"# HELP sealed_relay_connections_active Open WebSocket connections
# TYPE sealed_relay_connections_active gauge
sealed_relay_connections_active {connections}

# HELP sealed_relay_sessions_active Authenticated sessions
# TYPE sealed_relay_sessions_active gauge
sealed_relay_sessions_active {sessions}

# HELP sealed_relay_info Server information
# TYPE sealed_relay_info gauge
sealed_relay_info{{version="{version}"}} 1

# HELP sealed_relay_connections_total Total connections accepted
# TYPE sealed_relay_connections_total counter
sealed_relay_connections_total {conns_total}

# HELP sealed_relay_auth_success_total Successful authentications
# TYPE sealed_relay_auth_success_total counter
sealed_relay_auth_success_total {auth_ok}

# HELP sealed_relay_auth_failures_total Rejected authentications
# TYPE sealed_relay_auth_failures_total counter
sealed_relay_auth_failures_total {auth_failed}

# HELP sealed_relay_values_issued_total Protected values issued
# TYPE sealed_relay_values_issued_total counter
sealed_relay_values_issued_total {values}

# HELP sealed_relay_transcodes_total Values re-encrypted for a recipient key
# TYPE sealed_relay_transcodes_total counter
sealed_relay_transcodes_total {transcodes}

# HELP sealed_relay_keys_registered_total Public keys registered
# TYPE sealed_relay_keys_registered_total counter
sealed_relay_keys_registered_total {keys}

# HELP sealed_relay_rate_limit_hits_total Total rate limit rejections
# TYPE sealed_relay_rate_limit_hits_total counter
sealed_relay_rate_limit_hits_total {rate_limits}

# HELP sealed_relay_errors_total Error responses sent
# TYPE sealed_relay_errors_total counter
sealed_relay_errors_total {errors}
"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}
