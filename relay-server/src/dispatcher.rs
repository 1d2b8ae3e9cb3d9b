//! Per-connection request dispatcher.
//!
//! Every inbound text frame goes through the same steps:
//!
//! 1. rate limits (global, then this connection)
//! 2. envelope parse: JSON object with a string `type`, else `MalformedMessage`
//! 3. `AuthRequest` is handled without a session
//! 4. anything else must carry this connection's token
//!    (`NotAuthenticated` / `BadToken`)
//! 5. unknown `type` → `UnknownMessageType`; missing fields → `MalformedMessage`
//! 6. handler
//!
//! Every failure becomes an `Error` response on the same connection. Nothing
//! here closes the connection.

use crate::error::{ProtocolError, ProtocolResult};
use crate::server::SealedRelay;
use crate::session::{token_prefix, ConnectionId, Session};
use relay_crypto::{parse_public_key, reencrypt, verify_signature, CryptoError};
use relay_types::{
    AuthRequest, ClientMessage, DecryptionRequest, DecryptionResponse, EncryptedValueResponse,
    Envelope, ErrorCode, PublicKeyRegistration, ServerMessage,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Acknowledgement text for a stored public key.
pub const KEY_REGISTERED: &str = "public key registered";

/// Connection state machine states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Open, no session yet.
    Connected,
    /// Holds a session.
    Authenticated {
        /// The authenticated account.
        username: String,
    },
    /// Closed; the session (if any) has been dropped.
    Closed,
}

/// Dispatches one connection's frames.
pub struct Dispatcher {
    relay: Arc<SealedRelay>,
    connection: ConnectionId,
    state: ConnectionState,
}

impl Dispatcher {
    /// Create a dispatcher for a freshly accepted connection.
    pub fn new(relay: Arc<SealedRelay>, connection: ConnectionId) -> Self {
        Self {
            relay,
            connection,
            state: ConnectionState::Connected,
        }
    }

    /// This connection's identity.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Current state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Whether the connection holds a session.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, ConnectionState::Authenticated { .. })
    }

    /// Handle one text frame and produce the response to send back.
    pub async fn handle_text(&mut self, text: &str) -> ServerMessage {
        match self.process(text).await {
            Ok(response) => response,
            Err(e) => self.reject(e),
        }
    }

    /// Binary frames are not part of the protocol.
    pub fn handle_binary(&mut self, len: usize) -> ServerMessage {
        self.reject(ProtocolError::Wire(relay_types::WireError::Malformed {
            reason: format!("binary frame ({len} bytes)"),
        }))
    }

    /// Drop the session and mark the connection closed. Idempotent.
    pub fn close(&mut self) {
        if let Some(session) = self.relay.sessions().drop_connection(self.connection) {
            tracing::info!(
                "{} closed, dropped session {} ({})",
                self.connection,
                token_prefix(&session.token),
                session.username
            );
        }
        self.state = ConnectionState::Closed;
    }

    fn reject(&self, error: ProtocolError) -> ServerMessage {
        let code = error.code();
        self.relay.metrics().errors_total.fetch_add(1, Ordering::Relaxed);

        match code {
            ErrorCode::StoreIoError | ErrorCode::ProcessingError => {
                tracing::error!("{} request failed: {}", self.connection, error)
            }
            ErrorCode::ExternalServiceError | ErrorCode::RateLimited => {
                tracing::warn!("{} request failed: {}", self.connection, error)
            }
            _ => tracing::debug!("{} rejected: {}", self.connection, error),
        }

        ServerMessage::error(code)
    }

    async fn process(&mut self, text: &str) -> ProtocolResult<ServerMessage> {
        if let Err(e) = self.relay.rate_limits().check_frame(self.connection) {
            self.relay
                .metrics()
                .rate_limit_hits
                .fetch_add(1, Ordering::Relaxed);
            return Err(ProtocolError::RateLimited {
                reason: e.to_string(),
            });
        }

        let envelope = Envelope::parse(text)?;
        tracing::debug!("{} received {}", self.connection, envelope.kind());

        let session = if envelope.is_auth_request() {
            None
        } else {
            Some(
                self.relay
                    .sessions()
                    .validate(self.connection, envelope.token())?,
            )
        };

        match (envelope.decode()?, session) {
            (ClientMessage::AuthRequest(request), _) => Ok(self.handle_auth(request).await),
            (ClientMessage::RequestEncryptedValue(_), Some(session)) => {
                self.handle_request_value(&session).await
            }
            (ClientMessage::DecryptionRequest(request), Some(session)) => {
                self.handle_decryption(&session, request).await
            }
            (ClientMessage::PublicKeyRegistration(request), Some(session)) => {
                self.handle_registration(&session, request).await
            }
            (_, None) => Err(ProtocolError::NotAuthenticated),
        }
    }

    async fn handle_auth(&mut self, request: AuthRequest) -> ServerMessage {
        let result = self
            .relay
            .sessions()
            .authenticate(
                self.relay.store(),
                self.connection,
                &request.username,
                &request.password,
            )
            .await;

        match result {
            Ok(token) => {
                tracing::info!(
                    "{} authenticated as {} (token {})",
                    self.connection,
                    request.username,
                    token_prefix(&token)
                );
                self.relay
                    .metrics()
                    .auth_success_total
                    .fetch_add(1, Ordering::Relaxed);
                self.state = ConnectionState::Authenticated {
                    username: request.username,
                };
                ServerMessage::auth_success(token)
            }
            Err(_) => {
                tracing::warn!(
                    "{} failed authentication as {}",
                    self.connection,
                    request.username
                );
                self.relay
                    .metrics()
                    .auth_failures_total
                    .fetch_add(1, Ordering::Relaxed);
                ServerMessage::auth_failure()
            }
        }
    }

    async fn handle_request_value(&self, session: &Session) -> ProtocolResult<ServerMessage> {
        let datum = Zeroizing::new(self.relay.source().fetch().await?);
        let protected = self.relay.protection().protect(datum.as_bytes())?;

        self.relay
            .metrics()
            .values_issued_total
            .fetch_add(1, Ordering::Relaxed);
        tracing::info!("{} issued protected value to {}", self.connection, session.username);

        Ok(ServerMessage::EncryptedValueResponse(
            EncryptedValueResponse {
                encrypted_value: protected.into_string(),
            },
        ))
    }

    async fn handle_decryption(
        &self,
        session: &Session,
        request: DecryptionRequest,
    ) -> ProtocolResult<ServerMessage> {
        let unit = self.relay.protection().clone();
        let sealed = tokio::task::spawn_blocking(move || -> Result<String, CryptoError> {
            if let Some(signature) = &request.signature {
                verify_signature(
                    &request.public_key,
                    request.encrypted_value.as_bytes(),
                    signature,
                )?;
            }
            reencrypt(&unit, &request.encrypted_value, &request.public_key)
        })
        .await
        .map_err(|e| ProtocolError::Internal(e.to_string()))??;

        self.relay
            .metrics()
            .transcodes_total
            .fetch_add(1, Ordering::Relaxed);
        tracing::info!("{} transcoded value for {}", self.connection, session.username);

        Ok(ServerMessage::DecryptionResponse(DecryptionResponse {
            encrypted_plain_value: sealed,
        }))
    }

    async fn handle_registration(
        &self,
        session: &Session,
        request: PublicKeyRegistration,
    ) -> ProtocolResult<ServerMessage> {
        parse_public_key(&request.public_key)?;

        self.relay
            .store()
            .register_public_key(&session.username, &request.public_key)
            .await?;

        self.relay
            .metrics()
            .keys_registered_total
            .fetch_add(1, Ordering::Relaxed);
        tracing::info!("{} registered public key for {}", self.connection, session.username);

        Ok(ServerMessage::status(KEY_REGISTERED))
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if self.state != ConnectionState::Closed {
            self.close();
        }
    }
}
