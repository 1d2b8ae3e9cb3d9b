//! Error types for the sealed-relay wire protocol.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure kinds reported to the remote peer.
///
/// Each code carries a fixed description. Internal error detail is never
/// forwarded; only the code and its fixed text go on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Credentials did not match a known user.
    AuthenticationFailed,
    /// Request arrived before the connection authenticated.
    NotAuthenticated,
    /// Presented session token is missing or does not match.
    BadToken,
    /// Username has no record in the credential store.
    UnknownUser,
    /// Frame is not a JSON object with a string `type`, or lacks fields.
    MalformedMessage,
    /// `type` names no known request.
    UnknownMessageType,
    /// Protected value failed authentication (tampered or wrong key).
    IntegrityError,
    /// Public key is not a usable PEM-encoded RSA key.
    InvalidKey,
    /// Plaintext exceeds the OAEP bound for the recipient key.
    PayloadTooLarge,
    /// External data source failed, timed out, or returned non-2xx.
    ExternalServiceError,
    /// Credential store could not be persisted.
    #[serde(rename = "StoreIOError")]
    StoreIoError,
    /// Possession signature did not verify against the supplied key.
    InvalidSignature,
    /// Request rejected by rate limiting.
    RateLimited,
    /// Any other failure while processing the request.
    ProcessingError,
}

impl ErrorCode {
    /// Wire label for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::NotAuthenticated => "NotAuthenticated",
            Self::BadToken => "BadToken",
            Self::UnknownUser => "UnknownUser",
            Self::MalformedMessage => "MalformedMessage",
            Self::UnknownMessageType => "UnknownMessageType",
            Self::IntegrityError => "IntegrityError",
            Self::InvalidKey => "InvalidKey",
            Self::PayloadTooLarge => "PayloadTooLarge",
            Self::ExternalServiceError => "ExternalServiceError",
            Self::StoreIoError => "StoreIOError",
            Self::InvalidSignature => "InvalidSignature",
            Self::RateLimited => "RateLimited",
            Self::ProcessingError => "ProcessingError",
        }
    }

    /// Fixed peer-facing description.
    pub fn message(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "invalid credentials",
            Self::NotAuthenticated => "authentication required",
            Self::BadToken => "invalid token or session not found",
            Self::UnknownUser => "unknown user",
            Self::MalformedMessage => "malformed message",
            Self::UnknownMessageType => "unknown message type",
            Self::IntegrityError => "encrypted value failed integrity check",
            Self::InvalidKey => "public key is not a valid PEM-encoded RSA key",
            Self::PayloadTooLarge => "value too large for the supplied public key",
            Self::ExternalServiceError => "external service unavailable",
            Self::StoreIoError => "credential store unavailable",
            Self::InvalidSignature => "signature verification failed",
            Self::RateLimited => "rate limit exceeded",
            Self::ProcessingError => "request could not be processed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// Frame is not a JSON object with a string `type` field, or a typed
    /// body is missing required fields.
    #[error("malformed message: {reason}")]
    Malformed {
        /// Why the frame was rejected (logged, never sent).
        reason: String,
    },

    /// `type` names no known request.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl WireError {
    /// The peer-facing code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Malformed { .. } => ErrorCode::MalformedMessage,
            Self::UnknownType(_) => ErrorCode::UnknownMessageType,
            Self::Serialization(_) => ErrorCode::ProcessingError,
        }
    }
}
