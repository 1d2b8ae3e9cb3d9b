//! HTTP endpoints for sealed-relay.
//!
//! Served on a separate port from the WebSocket relay.

pub mod health;
mod metrics;

use crate::error::Result;
use crate::server::SealedRelay;
use axum::{routing::get, Extension, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<SealedRelay>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(Extension(relay))
}

/// Serve the HTTP endpoints on `listener` until the task is cancelled.
pub async fn serve(relay: Arc<SealedRelay>, listener: TcpListener) -> Result<()> {
    tracing::info!("HTTP endpoints listening on {}", listener.local_addr()?);
    axum::serve(listener, build_router(relay)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testing::test_relay;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (_dir, relay) = test_relay();
        let app = build_router(relay);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_ok() {
        let (_dir, relay) = test_relay();
        let app = build_router(relay);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (_dir, relay) = test_relay();
        let app = build_router(relay);

        let response = app
            .oneshot(Request::builder().uri("/users").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
