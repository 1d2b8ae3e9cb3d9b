//! Error types for sealed-relay-crypto.

use thiserror::Error;

/// Errors that can occur during protection or transcoding.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Protected value failed authentication.
    /// No details provided to prevent oracle attacks.
    #[error("integrity check failed")]
    IntegrityError,

    /// Public key could not be parsed as a PEM-encoded RSA key.
    #[error("invalid public key")]
    InvalidKey,

    /// Plaintext exceeds the OAEP bound for the recipient key.
    #[error("payload too large: {size} bytes (limit: {limit} bytes)")]
    PayloadTooLarge {
        /// Plaintext length.
        size: usize,
        /// Largest plaintext the key can carry.
        limit: usize,
    },

    /// Possession signature did not verify.
    #[error("signature verification failed")]
    InvalidSignature,

    /// Symmetric key material has the wrong length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Symmetric key material is not valid hex.
    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(#[from] hex::FromHexError),

    /// OS randomness unavailable.
    #[error("random source failed: {0}")]
    Random(String),

    /// Any other failure (detail is for logs only).
    #[error("processing failed: {0}")]
    Processing(String),
}
