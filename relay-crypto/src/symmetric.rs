//! Symmetric protection under the server-wide key.
//!
//! Bundle layout (base64 on the wire):
//!
//! ```text
//! +------------+-----------+-----------------+
//! | nonce (12) | tag (16)  | ciphertext (n)  |
//! +------------+-----------+-----------------+
//! ```

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// Key size for AES-256-GCM (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Nonce size for AES-256-GCM (96 bits = 12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (128 bits = 16 bytes).
pub const TAG_SIZE: usize = 16;

/// Bytes a bundle carries on top of the ciphertext.
pub const BUNDLE_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// The server-wide symmetric key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Generate a fresh key from the OS CSPRNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_SIZE];
        getrandom::getrandom(&mut bytes).map_err(|e| CryptoError::Random(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a hex-encoded key.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let decoded = Zeroizing::new(hex::decode(encoded.trim())?);
        if decoded.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: decoded.len(),
            });
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    /// Hex encoding for persistence.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

// Don't leak key in debug output
impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// A base64 nonce ‖ tag ‖ ciphertext bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedValue(String);

impl ProtectedValue {
    /// Borrow the base64 text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the base64 text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ProtectedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// AES-256-GCM protect/unprotect under one key.
#[derive(Clone)]
pub struct ProtectionUnit {
    cipher: Aes256Gcm,
}

impl fmt::Debug for ProtectionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectionUnit").finish_non_exhaustive()
    }
}

impl ProtectionUnit {
    /// Create a unit for `key`.
    pub fn new(key: &SymmetricKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
        }
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn protect(&self, plaintext: &[u8]) -> Result<ProtectedValue, CryptoError> {
        let mut nonce = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce).map_err(|e| CryptoError::Random(e.to_string()))?;

        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
            .map_err(|e| CryptoError::Processing(e.to_string()))?;

        let mut bundle = Vec::with_capacity(BUNDLE_OVERHEAD + buffer.len());
        bundle.extend_from_slice(&nonce);
        bundle.extend_from_slice(&tag);
        bundle.extend_from_slice(&buffer);

        Ok(ProtectedValue(STANDARD.encode(bundle)))
    }

    /// Decrypt a bundle produced by [`ProtectionUnit::protect`].
    ///
    /// Returns `IntegrityError` for anything that does not authenticate:
    /// bad base64, a truncated bundle, a flipped bit, or the wrong key.
    pub fn unprotect(&self, bundle: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let raw = STANDARD
            .decode(bundle.trim())
            .map_err(|_| CryptoError::IntegrityError)?;
        if raw.len() < BUNDLE_OVERHEAD {
            return Err(CryptoError::IntegrityError);
        }

        let (nonce, rest) = raw.split_at(NONCE_SIZE);
        let (tag, ciphertext) = rest.split_at(TAG_SIZE);

        let mut buffer = Zeroizing::new(ciphertext.to_vec());
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(nonce),
                b"",
                buffer.as_mut_slice(),
                Tag::from_slice(tag),
            )
            .map_err(|_| CryptoError::IntegrityError)?;

        Ok(buffer)
    }
}
