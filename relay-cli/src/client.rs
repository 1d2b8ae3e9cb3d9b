//! WebSocket client for sealed-relay.
//!
//! One request in flight at a time: each call sends a frame and waits for
//! the next text frame in reply.

use futures_util::{SinkExt, StreamExt};
use relay_crypto::{CryptoError, RecipientKeyPair};
use relay_types::{
    AuthRequest, ClientMessage, DecryptionRequest, ErrorCode, PublicKeyRegistration,
    RequestEncryptedValue, ServerMessage, WireError,
};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use zeroize::Zeroizing;

/// Client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// WebSocket connect, send, or receive failed.
    #[error("transport error: {0}")]
    Transport(#[from] WsError),

    /// Frame could not be encoded or decoded.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Relay answered with an `Error` response.
    #[error("relay error {code}: {message}")]
    Relay {
        /// Taxonomy code.
        code: ErrorCode,
        /// Fixed description.
        message: String,
    },

    /// Credentials rejected.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A request needing a session was made before authenticating.
    #[error("not authenticated; call authenticate first")]
    NoSession,

    /// Relay answered with the wrong response type.
    #[error("unexpected response: expected {expected}, got {actual}")]
    Unexpected {
        /// Expected response type.
        expected: &'static str,
        /// Received response type.
        actual: &'static str,
    },

    /// Relay closed the connection.
    #[error("connection closed by relay")]
    Closed,

    /// Local key or decryption failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Result type alias for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// A connection to a relay.
pub struct RelayClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    token: Option<String>,
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl RelayClient {
    /// Connect to `url` (e.g. `ws://127.0.0.1:8765`).
    pub async fn connect(url: &str) -> ClientResult<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(url).await?;
        tracing::debug!("Connected to {}", url);
        Ok(Self { ws, token: None })
    }

    /// Whether this client holds a session token.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Log in and keep the returned token for later requests.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> ClientResult<()> {
        let request = ClientMessage::AuthRequest(AuthRequest {
            username: username.to_string(),
            password: password.to_string(),
        });

        match self.call(&request).await? {
            ServerMessage::AuthResponse(auth) if auth.success => match auth.token {
                Some(token) => {
                    self.token = Some(token);
                    Ok(())
                }
                None => Err(ClientError::AuthenticationFailed(
                    "relay returned no token".to_string(),
                )),
            },
            ServerMessage::AuthResponse(auth) => Err(ClientError::AuthenticationFailed(
                auth.error.unwrap_or_default(),
            )),
            other => Err(unexpected("AuthResponse", &other)),
        }
    }

    /// Ask the relay for its protected value.
    pub async fn request_encrypted_value(&mut self) -> ClientResult<String> {
        let request = ClientMessage::RequestEncryptedValue(RequestEncryptedValue {
            token: self.token()?,
        });

        match self.call(&request).await? {
            ServerMessage::EncryptedValueResponse(r) => Ok(r.encrypted_value),
            other => Err(unexpected("EncryptedValueResponse", &other)),
        }
    }

    /// Store `public_key_pem` as this user's key.
    pub async fn register_public_key(&mut self, public_key_pem: &str) -> ClientResult<String> {
        let request = ClientMessage::PublicKeyRegistration(PublicKeyRegistration {
            token: self.token()?,
            public_key: public_key_pem.to_string(),
        });

        match self.call(&request).await? {
            ServerMessage::Status(status) => Ok(status.message),
            other => Err(unexpected("Status", &other)),
        }
    }

    /// Have `encrypted_value` transcoded for `recipient` and open it locally.
    ///
    /// The value is signed with the recipient key so the relay can check
    /// possession.
    pub async fn decrypt(
        &mut self,
        encrypted_value: &str,
        recipient: &RecipientKeyPair,
    ) -> ClientResult<Zeroizing<Vec<u8>>> {
        let request = ClientMessage::DecryptionRequest(DecryptionRequest {
            token: self.token()?,
            public_key: recipient.public_key_pem().to_string(),
            encrypted_value: encrypted_value.to_string(),
            signature: Some(recipient.sign(encrypted_value.as_bytes())),
        });

        match self.call(&request).await? {
            ServerMessage::DecryptionResponse(r) => Ok(recipient.open(&r.encrypted_plain_value)?),
            other => Err(unexpected("DecryptionResponse", &other)),
        }
    }

    /// Send a raw text frame and return the relay's reply.
    pub async fn send_raw(&mut self, text: &str) -> ClientResult<ServerMessage> {
        self.ws.send(Message::text(text.to_string())).await?;
        self.recv().await
    }

    /// Close the connection.
    pub async fn close(mut self) -> ClientResult<()> {
        match self.ws.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn token(&self) -> ClientResult<String> {
        self.token.clone().ok_or(ClientError::NoSession)
    }

    async fn call(&mut self, request: &ClientMessage) -> ClientResult<ServerMessage> {
        tracing::debug!("Sending {}", request.kind());
        let reply = self.send_raw(&request.to_json()?).await?;
        match reply {
            ServerMessage::Error(e) => Err(ClientError::Relay {
                code: e.code,
                message: e.message,
            }),
            other => Ok(other),
        }
    }

    async fn recv(&mut self) -> ClientResult<ServerMessage> {
        while let Some(frame) = self.ws.next().await {
            match frame? {
                Message::Text(text) => return Ok(ServerMessage::from_json(text.as_str())?),
                Message::Close(_) => return Err(ClientError::Closed),
                _ => continue,
            }
        }
        Err(ClientError::Closed)
    }
}

fn unexpected(expected: &'static str, actual: &ServerMessage) -> ClientError {
    ClientError::Unexpected {
        expected,
        actual: actual.type_name(),
    }
}
