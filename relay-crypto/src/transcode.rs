//! Asymmetric transcoding: unprotect, then RSA-OAEP for a recipient.
//!
//! OAEP uses SHA-256 for both the label hash and MGF1, matching what
//! browser and forge-style clients expect for `RSA-OAEP` with SHA-256.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::symmetric::ProtectionUnit;

/// SHA-256 output length, used by the OAEP size bound.
pub const HASH_LEN: usize = 32;

/// Parse a PEM public key (SPKI `PUBLIC KEY` or PKCS#1 `RSA PUBLIC KEY`).
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|_| CryptoError::InvalidKey)
}

/// Largest plaintext `key` can carry under OAEP-SHA256: `k - 2*hLen - 2`.
pub fn max_plaintext_len(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(2 * HASH_LEN + 2)
}

/// Encrypt `plaintext` for `key`, returning base64 ciphertext.
///
/// Oversized plaintext fails with `PayloadTooLarge`; it is never truncated.
pub fn seal_for(key: &RsaPublicKey, plaintext: &[u8]) -> Result<String, CryptoError> {
    let limit = max_plaintext_len(key);
    if plaintext.len() > limit {
        return Err(CryptoError::PayloadTooLarge {
            size: plaintext.len(),
            limit,
        });
    }

    let ciphertext = key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|e| CryptoError::Processing(e.to_string()))?;

    Ok(STANDARD.encode(ciphertext))
}

/// Transcode a protected bundle into an OAEP envelope for `recipient_pem`.
///
/// The key is parsed first; plaintext only exists between a successful
/// unprotect and the OAEP encryption, and is zeroized on return.
pub fn reencrypt(
    unit: &ProtectionUnit,
    bundle: &str,
    recipient_pem: &str,
) -> Result<String, CryptoError> {
    let key = parse_public_key(recipient_pem)?;
    let plaintext = unit.unprotect(bundle)?;
    seal_for(&key, &plaintext)
}

/// Verify a base64 RSA PKCS#1 v1.5 / SHA-256 signature over `message`.
pub fn verify_signature(
    public_pem: &str,
    message: &[u8],
    signature_b64: &str,
) -> Result<(), CryptoError> {
    let key = parse_public_key(public_pem)?;
    let raw = STANDARD
        .decode(signature_b64.trim())
        .map_err(|_| CryptoError::InvalidSignature)?;
    let signature =
        Signature::try_from(raw.as_slice()).map_err(|_| CryptoError::InvalidSignature)?;

    VerifyingKey::<Sha256>::new(key)
        .verify(message, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// A recipient's RSA key pair.
///
/// Clients use this to register a public key, prove possession by signing,
/// and open values transcoded for them.
#[derive(Clone)]
pub struct RecipientKeyPair {
    private: RsaPrivateKey,
    public_pem: String,
}

impl fmt::Debug for RecipientKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipientKeyPair")
            .field("bits", &(self.private.size() * 8))
            .field("private", &"[REDACTED]")
            .finish()
    }
}

impl RecipientKeyPair {
    /// Generate a new key pair of `bits` modulus size.
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::Processing(e.to_string()))?;
        Self::from_private(private)
    }

    /// Wrap an existing private key.
    pub fn from_private(private: RsaPrivateKey) -> Result<Self, CryptoError> {
        let public_pem = private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Processing(e.to_string()))?;
        Ok(Self {
            private,
            public_pem,
        })
    }

    /// SPKI PEM of the public half.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    /// Largest plaintext a transcoded value for this key can carry.
    pub fn max_plaintext_len(&self) -> usize {
        max_plaintext_len(&self.private.to_public_key())
    }

    /// Sign `message` (PKCS#1 v1.5 / SHA-256), base64-encoded.
    pub fn sign(&self, message: &[u8]) -> String {
        let signing_key = SigningKey::<Sha256>::new(self.private.clone());
        STANDARD.encode(signing_key.sign(message).to_vec())
    }

    /// Open a base64 OAEP envelope produced by [`seal_for`] or [`reencrypt`].
    pub fn open(&self, sealed_b64: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let ciphertext = STANDARD
            .decode(sealed_b64.trim())
            .map_err(|_| CryptoError::IntegrityError)?;
        self.private
            .decrypt(Oaep::new::<Sha256>(), &ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::IntegrityError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetric::SymmetricKey;
    use rsa::pkcs1::EncodeRsaPublicKey;
    use std::sync::OnceLock;

    // Key generation is slow in debug builds; share one pair across tests.
    fn recipient() -> &'static RecipientKeyPair {
        static PAIR: OnceLock<RecipientKeyPair> = OnceLock::new();
        PAIR.get_or_init(|| RecipientKeyPair::generate(1024).unwrap())
    }

    fn unit() -> ProtectionUnit {
        ProtectionUnit::new(&SymmetricKey::from_bytes([0x11; 32]))
    }

    #[test]
    fn oaep_bound_for_1024_bit_key() {
        assert_eq!(recipient().max_plaintext_len(), 128 - 2 * 32 - 2);
    }

    #[test]
    fn reencrypt_then_open_recovers_plaintext() {
        let unit = unit();
        let pair = recipient();
        let plaintext = b"API_DATA: sunt aut facere | ID: 1";

        let bundle = unit.protect(plaintext).unwrap();
        let sealed = reencrypt(&unit, bundle.as_str(), pair.public_key_pem()).unwrap();
        let opened = pair.open(&sealed).unwrap();

        assert_eq!(opened.as_slice(), plaintext);
    }

    #[test]
    fn reencrypt_accepts_plaintext_at_bound() {
        let unit = unit();
        let pair = recipient();
        let limit = pair.max_plaintext_len();

        for len in [0, 1, limit - 1, limit] {
            let plaintext = vec![0x5A; len];
            let bundle = unit.protect(&plaintext).unwrap();
            let sealed = reencrypt(&unit, bundle.as_str(), pair.public_key_pem()).unwrap();
            assert_eq!(pair.open(&sealed).unwrap().as_slice(), &plaintext[..]);
        }
    }

    #[test]
    fn reencrypt_rejects_plaintext_over_bound() {
        let unit = unit();
        let pair = recipient();
        let limit = pair.max_plaintext_len();

        let bundle = unit.protect(&vec![0u8; limit + 1]).unwrap();
        let result = reencrypt(&unit, bundle.as_str(), pair.public_key_pem());

        assert!(matches!(
            result,
            Err(CryptoError::PayloadTooLarge { size, limit: l }) if size == limit + 1 && l == limit
        ));
    }

    #[test]
    fn reencrypt_rejects_malformed_pem() {
        let unit = unit();
        let bundle = unit.protect(b"value").unwrap();
        for pem in [
            "",
            "not a key",
            "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----",
        ] {
            assert!(matches!(
                reencrypt(&unit, bundle.as_str(), pem),
                Err(CryptoError::InvalidKey)
            ));
        }
    }

    #[test]
    fn invalid_key_wins_over_bad_bundle() {
        assert!(matches!(
            reencrypt(&unit(), "garbage", "not a key"),
            Err(CryptoError::InvalidKey)
        ));
    }

    #[test]
    fn reencrypt_propagates_integrity_error() {
        let unit = unit();
        let bundle = unit.protect(b"value").unwrap();
        let mut raw = STANDARD.decode(bundle.as_str()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;

        let result = reencrypt(&unit, &STANDARD.encode(raw), recipient().public_key_pem());
        assert!(matches!(result, Err(CryptoError::IntegrityError)));
    }

    #[test]
    fn pkcs1_pem_is_accepted() {
        let pair = recipient();
        let spki = parse_public_key(pair.public_key_pem()).unwrap();
        let pkcs1 = spki.to_pkcs1_pem(LineEnding::LF).unwrap();

        let parsed = parse_public_key(&pkcs1).unwrap();
        assert_eq!(parsed, spki);
    }

    #[test]
    fn signature_roundtrip() {
        let pair = recipient();
        let message = b"encrypted-value-b64";
        let signature = pair.sign(message);

        verify_signature(pair.public_key_pem(), message, &signature).unwrap();
    }

    #[test]
    fn signature_over_other_message_is_rejected() {
        let pair = recipient();
        let signature = pair.sign(b"one");
        assert!(matches!(
            verify_signature(pair.public_key_pem(), b"two", &signature),
            Err(CryptoError::InvalidSignature)
        ));
        assert!(matches!(
            verify_signature(pair.public_key_pem(), b"one", "not base64!"),
            Err(CryptoError::InvalidSignature)
        ));
    }

    #[test]
    fn open_rejects_foreign_ciphertext() {
        assert!(matches!(
            recipient().open(&STANDARD.encode([7u8; 128])),
            Err(CryptoError::IntegrityError)
        ));
    }

    #[test]
    fn debug_redacts_private_key() {
        let debug = format!("{:?}", recipient());
        assert!(debug.contains("REDACTED"));
        assert!(debug.contains("1024"));
    }
}
