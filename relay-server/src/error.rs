//! Error types for sealed-relay.

use relay_crypto::CryptoError;
use relay_types::{ErrorCode, WireError};
use std::path::PathBuf;

/// Main error type for sealed-relay startup and serving.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Credential store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// External data source error.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Credential store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the store file failed.
    #[error("store I/O error at {path}: {source}")]
    Io {
        /// Store file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Store file is not valid JSON for the store schema.
    #[error("corrupt store at {path}: {source}")]
    Corrupt {
        /// Store file path.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// Persisted symmetric key is unusable.
    #[error("invalid symmetric key in store: {0}")]
    InvalidKey(#[source] CryptoError),

    /// A user record has neither a hash nor a legacy password.
    #[error("user {username} has no credential")]
    MissingCredential {
        /// The user with no credential.
        username: String,
    },

    /// Username has no record.
    #[error("unknown user: {username}")]
    UnknownUser {
        /// The username that was not found.
        username: String,
    },

    /// Password hashing failed.
    #[error("password hashing failed: {0}")]
    Hash(String),

    /// Blocking task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(String),
}

/// External data source errors.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Request exceeded the configured timeout.
    #[error("request timed out after {secs}s")]
    Timeout {
        /// Configured timeout.
        secs: u64,
    },

    /// Non-2xx response.
    #[error("unexpected status: {0}")]
    Status(u16),

    /// Response body lacked the expected fields.
    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

/// Per-request errors, recovered at the dispatcher and reported to the peer
/// as an [`ErrorCode`].
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Credentials rejected.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// No session on this connection.
    #[error("session not authenticated: AuthRequest required first")]
    NotAuthenticated,

    /// Presented token missing or wrong.
    #[error("bad session token")]
    BadToken,

    /// Frame could not be decoded.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Protection or transcoding failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Credential store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// External data source failed.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Rate limit exceeded.
    #[error("rate limit exceeded: {reason}")]
    RateLimited {
        /// Reason for rate limiting.
        reason: String,
    },

    /// Internal error (task join failure, serialization).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    /// The peer-facing code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AuthenticationFailed => ErrorCode::AuthenticationFailed,
            Self::NotAuthenticated => ErrorCode::NotAuthenticated,
            Self::BadToken => ErrorCode::BadToken,
            Self::Wire(e) => e.code(),
            Self::Crypto(e) => match e {
                CryptoError::IntegrityError => ErrorCode::IntegrityError,
                CryptoError::InvalidKey => ErrorCode::InvalidKey,
                CryptoError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
                CryptoError::InvalidSignature => ErrorCode::InvalidSignature,
                _ => ErrorCode::ProcessingError,
            },
            Self::Store(StoreError::UnknownUser { .. }) => ErrorCode::UnknownUser,
            Self::Store(_) => ErrorCode::StoreIoError,
            Self::Source(_) => ErrorCode::ExternalServiceError,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::Internal(_) => ErrorCode::ProcessingError,
        }
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
