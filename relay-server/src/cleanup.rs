//! Background maintenance task.
//!
//! Evicts idle rate-limiter keys and logs a periodic load summary.

use crate::config::CleanupConfig;
use crate::protocol::timer_duration;
use crate::server::SealedRelay;
use std::sync::Arc;
use tokio::time::interval;

/// Spawn the maintenance task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_task(
    relay: Arc<SealedRelay>,
    config: CleanupConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Cleanup task disabled");
            return;
        }

        let interval_secs = config.interval_secs.max(1);
        tracing::info!("Cleanup task started (interval: {}s)", interval_secs);

        let mut timer = interval(timer_duration(interval_secs));
        // First tick completes immediately.
        timer.tick().await;

        loop {
            timer.tick().await;
            run_once(&relay);
        }
    })
}

/// One maintenance pass.
pub fn run_once(relay: &SealedRelay) {
    let limits = relay.rate_limits();
    let before = limits.connection_keys_count() + limits.message_keys_count();
    limits.shrink();
    let after = limits.connection_keys_count() + limits.message_keys_count();

    tracing::debug!(
        "Cleanup: limiter keys {} -> {}, {} connections, {} sessions",
        before,
        after,
        relay.active_connections(),
        relay.sessions().len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testing::test_relay;
    use crate::session::ConnectionId;
    use std::time::Duration;

    #[tokio::test]
    async fn cleanup_task_disabled() {
        let (_dir, relay) = test_relay();
        let config = CleanupConfig {
            interval_secs: 1,
            enabled: false,
        };

        let handle = spawn_cleanup_task(relay, config);

        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("Task should complete when disabled")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn cleanup_task_runs_until_aborted() {
        let (_dir, relay) = test_relay();
        let config = CleanupConfig {
            interval_secs: 1,
            enabled: true,
        };

        let handle = spawn_cleanup_task(relay, config);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }

    #[test]
    fn run_once_keeps_limiters_usable() {
        let (_dir, relay) = test_relay();
        let conn = ConnectionId::next();
        relay.rate_limits().check_frame(conn).unwrap();

        run_once(&relay);

        assert!(relay.rate_limits().check_frame(conn).is_ok());
    }
}
