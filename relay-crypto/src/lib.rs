//! # sealed-relay-crypto
//!
//! Cryptographic core of sealed-relay.
//!
//! - [`ProtectionUnit`] - AES-256-GCM protect/unprotect under the server-wide key
//! - [`reencrypt`] - unprotect, then RSA-OAEP (SHA-256, MGF1-SHA-256) for a recipient
//! - [`RecipientKeyPair`] - client-side key pair that opens transcoded values
//!
//! # Security Notes
//!
//! - Nonces are 96 bits from the OS CSPRNG on every call, never a counter
//! - Any tag mismatch is an [`CryptoError::IntegrityError`], never garbage plaintext
//! - Decrypted plaintext is held in [`zeroize::Zeroizing`] buffers
//! - A recipient key is parsed before the bundle is opened, so a bad key
//!   never causes plaintext to exist

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub mod symmetric;
pub mod transcode;

pub use error::CryptoError;
pub use symmetric::{ProtectedValue, ProtectionUnit, SymmetricKey};
pub use transcode::{
    max_plaintext_len, parse_public_key, reencrypt, seal_for, verify_signature,
    RecipientKeyPair,
};
