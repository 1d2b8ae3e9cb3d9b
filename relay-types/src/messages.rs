//! Protocol messages for sealed-relay.
//!
//! Inbound requests form a closed set ([`ClientMessage`]); the dispatcher
//! matches on it exhaustively. Field names on the wire are camelCase.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ErrorCode, WireError};

/// Discriminator for inbound requests (the `type` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Username/password login
    AuthRequest,
    /// Fetch the external datum, protected under the server key
    RequestEncryptedValue,
    /// Unprotect a value and re-encrypt it for the caller's public key
    DecryptionRequest,
    /// Store the caller's public key
    PublicKeyRegistration,
}

impl MessageKind {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthRequest => "AuthRequest",
            Self::RequestEncryptedValue => "RequestEncryptedValue",
            Self::DecryptionRequest => "DecryptionRequest",
            Self::PublicKeyRegistration => "PublicKeyRegistration",
        }
    }
}

impl FromStr for MessageKind {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AuthRequest" => Ok(Self::AuthRequest),
            "RequestEncryptedValue" => Ok(Self::RequestEncryptedValue),
            "DecryptionRequest" => Ok(Self::DecryptionRequest),
            "PublicKeyRegistration" => Ok(Self::PublicKeyRegistration),
            other => Err(WireError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All inbound requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Login
    AuthRequest(AuthRequest),
    /// Request a protected value
    RequestEncryptedValue(RequestEncryptedValue),
    /// Transcode a protected value
    DecryptionRequest(DecryptionRequest),
    /// Register a public key
    PublicKeyRegistration(PublicKeyRegistration),
}

impl ClientMessage {
    /// Discriminator of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::AuthRequest(_) => MessageKind::AuthRequest,
            Self::RequestEncryptedValue(_) => MessageKind::RequestEncryptedValue,
            Self::DecryptionRequest(_) => MessageKind::DecryptionRequest,
            Self::PublicKeyRegistration(_) => MessageKind::PublicKeyRegistration,
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }
}

/// Login request. Only meaningful before authentication (or to replace the
/// current session).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Account name
    pub username: String,
    /// Account password (never logged)
    pub password: String,
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Ask the relay for the external datum, protected under the server key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEncryptedValue {
    /// Session token
    pub token: String,
}

/// Ask the relay to transcode a protected value for `public_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionRequest {
    /// Session token
    pub token: String,
    /// Recipient public key (PEM)
    pub public_key: String,
    /// Protected value previously issued by the relay (base64)
    pub encrypted_value: String,
    /// Optional base64 RSA PKCS#1 v1.5 / SHA-256 signature over
    /// `encrypted_value`, proving possession of the private key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Store (or replace) the caller's public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyRegistration {
    /// Session token
    pub token: String,
    /// Public key (PEM)
    pub public_key: String,
}

/// All outbound responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Result of an AuthRequest
    AuthResponse(AuthResponse),
    /// Protected value
    EncryptedValueResponse(EncryptedValueResponse),
    /// Value re-encrypted for the caller
    DecryptionResponse(DecryptionResponse),
    /// Generic success acknowledgement
    Status(Status),
    /// Failure with a fixed description
    Error(ErrorResponse),
}

impl ServerMessage {
    /// Successful login carrying the new session token.
    pub fn auth_success(token: impl Into<String>) -> Self {
        Self::AuthResponse(AuthResponse {
            success: true,
            token: Some(token.into()),
            error: None,
        })
    }

    /// Failed login. Does not say which credential was wrong.
    pub fn auth_failure() -> Self {
        Self::AuthResponse(AuthResponse {
            success: false,
            token: None,
            error: Some(ErrorCode::AuthenticationFailed.message().to_string()),
        })
    }

    /// Error response for `code`, carrying only its fixed text.
    pub fn error(code: ErrorCode) -> Self {
        Self::Error(ErrorResponse {
            code,
            message: code.message().to_string(),
        })
    }

    /// Status acknowledgement.
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status(Status {
            message: message.into(),
        })
    }

    /// Wire name of this response.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AuthResponse(_) => "AuthResponse",
            Self::EncryptedValueResponse(_) => "EncryptedValueResponse",
            Self::DecryptionResponse(_) => "DecryptionResponse",
            Self::Status(_) => "Status",
            Self::Error(_) => "Error",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }

    /// Parse a JSON text frame (client side).
    pub fn from_json(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(|e| WireError::Malformed {
            reason: e.to_string(),
        })
    }
}

/// Login result.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Whether authentication succeeded
    pub success: bool,
    /// Session token (on success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Failure text (on failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResponse")
            .field("success", &self.success)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("error", &self.error)
            .finish()
    }
}

/// Protected value for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedValueResponse {
    /// base64(nonce ‖ tag ‖ ciphertext)
    pub encrypted_value: String,
}

/// Value re-encrypted under the caller's public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionResponse {
    /// base64 RSA-OAEP ciphertext
    pub encrypted_plain_value: String,
}

/// Generic acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Human-readable status text
    pub message: String,
}

/// Failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Taxonomy label
    pub code: ErrorCode,
    /// Fixed description for `code`
    pub message: String,
}
