//! WebSocket transport.
//!
//! Accepts TCP connections, upgrades them to WebSocket, and runs one task per
//! connection. Each task owns a [`Dispatcher`] and drives it with inbound
//! text frames until the peer goes away.
//!
//! ## Connection lifecycle
//!
//! ```text
//! accept ── IP rate limit ── session cap ── WS handshake
//!                                               │
//!                  ┌────────────────────────────┘
//!                  ▼
//!        ┌───────────────────┐  frame    ┌────────────┐
//!        │   select! loop    ├──────────►│ Dispatcher │
//!        │ ping / auth timer │◄──────────┤            │
//!        └─────────┬─────────┘  response └────────────┘
//!                  │ close, error, keep-alive or auth timeout
//!                  ▼
//!          Dispatcher::close  (session dropped)
//! ```

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::server::{ConnectionGuard, SealedRelay};
use crate::session::ConnectionId;
use futures_util::{SinkExt, StreamExt};
use relay_types::ServerMessage;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval_at, sleep_until, timeout_at, Instant};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Upper bound on any configured timer, so deadline arithmetic cannot overflow.
const MAX_TIMER_SECS: u64 = 365 * 24 * 60 * 60;

/// Configured seconds as a timer duration, clamped to [`MAX_TIMER_SECS`].
pub fn timer_duration(secs: u64) -> Duration {
    Duration::from_secs(secs.min(MAX_TIMER_SECS))
}

/// Accept connections on `listener` until the task is cancelled.
pub async fn serve(relay: Arc<SealedRelay>, listener: TcpListener) -> Result<()> {
    tracing::info!("WebSocket relay listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("Accept failed: {}", e);
                continue;
            }
        };

        if let Err(e) = relay.rate_limits().check_connection(peer.ip()) {
            tracing::warn!("Connection rate limited for {}: {}", peer, e);
            relay.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let Some(guard) = relay.try_acquire_connection() else {
            tracing::warn!(
                "Connection limit reached ({}), rejecting {}",
                relay.config().limits.max_concurrent_sessions,
                peer
            );
            continue;
        };

        relay
            .metrics()
            .connections_total
            .fetch_add(1, Ordering::Relaxed);

        let relay = relay.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(relay, stream, peer, guard).await {
                tracing::debug!("Connection from {} ended with error: {}", peer, e);
            }
        });
    }
}

/// Run one connection to completion. The session is dropped on every exit
/// path.
///
/// The authentication deadline starts at accept, so it also bounds the
/// WebSocket handshake.
pub async fn handle_connection(
    relay: Arc<SealedRelay>,
    stream: TcpStream,
    peer: SocketAddr,
    _guard: ConnectionGuard,
) -> std::result::Result<(), WsError> {
    let auth_timeout = relay.config().limits.auth_timeout_secs;
    let auth_deadline = Instant::now() + timer_duration(auth_timeout);

    let server = &relay.config().server;
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(server.max_message_size);
    ws_config.max_frame_size = Some(server.max_message_size);

    let handshake = tokio_tungstenite::accept_async_with_config(stream, Some(ws_config));
    let ws = match timeout_at(auth_deadline, handshake).await {
        Ok(ws) => ws?,
        Err(_) => {
            tracing::warn!("Handshake timeout ({}s) for {}", auth_timeout, peer);
            return Ok(());
        }
    };
    let (mut sink, mut inbound) = ws.split();

    let connection = ConnectionId::next();
    tracing::info!("New connection {} from {}", connection, peer);

    let ping_every = timer_duration(server.ping_interval_secs.max(1));
    let idle_limit = ping_every + timer_duration(server.ping_timeout_secs);

    let mut dispatcher = Dispatcher::new(relay.clone(), connection);
    let mut ping = interval_at(Instant::now() + ping_every, ping_every);
    let mut last_seen = Instant::now();

    let outcome = loop {
        tokio::select! {
            frame = inbound.next() => {
                let Some(frame) = frame else {
                    break Ok(());
                };
                last_seen = Instant::now();

                let reply = match frame {
                    Ok(Message::Text(text)) => dispatcher.handle_text(text.as_str()).await,
                    Ok(Message::Binary(data)) => dispatcher.handle_binary(data.len()),
                    Ok(Message::Close(_)) => break Ok(()),
                    Ok(_) => continue,
                    Err(e) => break Err(e),
                };

                if let Err(e) = send_reply(&mut sink, &reply).await {
                    break Err(e);
                }
            }
            _ = ping.tick() => {
                if last_seen.elapsed() > idle_limit {
                    tracing::warn!("Keep-alive timeout for {}", connection);
                    break Ok(());
                }
                if let Err(e) = sink.send(Message::Ping(Default::default())).await {
                    break Err(e);
                }
            }
            _ = sleep_until(auth_deadline), if !dispatcher.is_authenticated() => {
                tracing::warn!("Authentication timeout ({}s) for {}", auth_timeout, connection);
                let _ = sink.send(Message::Close(None)).await;
                break Ok(());
            }
        }
    };

    dispatcher.close();
    tracing::info!("Connection {} from {} closed", connection, peer);

    match outcome {
        Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
        other => other,
    }
}

async fn send_reply<S>(sink: &mut S, reply: &ServerMessage) -> std::result::Result<(), WsError>
where
    S: futures_util::Sink<Message, Error = WsError> + Unpin,
{
    match reply.to_json() {
        Ok(json) => sink.send(Message::text(json)).await,
        Err(e) => {
            tracing::error!("Failed to encode {}: {}", reply.type_name(), e);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_duration_passes_small_values() {
        assert_eq!(timer_duration(0), Duration::ZERO);
        assert_eq!(timer_duration(20), Duration::from_secs(20));
    }

    #[test]
    fn timer_duration_clamps_huge_values() {
        let clamped = timer_duration(u64::MAX);
        assert_eq!(clamped, Duration::from_secs(MAX_TIMER_SECS));
        assert!(Instant::now().checked_add(clamped + clamped).is_some());
    }
}
