//! Envelope encryption of report content.
//!
//! Content is sealed for exactly one recipient: an ephemeral X25519 key is
//! agreed with the recipient's public key, the shared secret is run through a
//! BLAKE3 KDF bound to both public keys, and the plaintext is encrypted with
//! ChaCha20-Poly1305.
//!
//! The result is a single compact string with four base64url segments:
//!
//! ```text
//! header . ephemeral_public_key . nonce . ciphertext
//! ```
//!
//! The header is JSON naming the algorithms, so a token can be decrypted with
//! no out-of-band negotiation. The encoded header is authenticated as AEAD
//! associated data.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{
    EncryptionNonce, Entropy, EphemeralKeyPair, OsEntropy, X25519PublicKey, X25519StaticSecret,
};
use crate::error::{PermsError, Result};

/// Current token version.
pub const TOKEN_VERSION: u8 = 1;

/// Key agreement algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAgreement {
    /// Ephemeral-static X25519 with BLAKE3 key derivation.
    #[serde(rename = "ECDH-ES+X25519")]
    EcdhEsX25519,
}

/// Content encryption algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentEncryption {
    /// ChaCha20-Poly1305 with 256-bit key.
    #[serde(rename = "C20P")]
    ChaCha20Poly1305,
}

/// Self-describing token header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub v: u8,
    pub alg: KeyAgreement,
    pub enc: ContentEncryption,
}

impl Default for TokenHeader {
    fn default() -> Self {
        Self {
            v: TOKEN_VERSION,
            alg: KeyAgreement::EcdhEsX25519,
            enc: ContentEncryption::ChaCha20Poly1305,
        }
    }
}

/// A compact, self-describing encrypted token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedToken(String);

impl EncryptedToken {
    /// Encrypt `plaintext` for the holder of `recipient`.
    pub fn encrypt(plaintext: &[u8], recipient: &X25519PublicKey) -> Result<Self> {
        Self::encrypt_with(&OsEntropy, plaintext, recipient)
    }

    /// Encrypt drawing randomness from `entropy`.
    pub fn encrypt_with(
        entropy: &dyn Entropy,
        plaintext: &[u8],
        recipient: &X25519PublicKey,
    ) -> Result<Self> {
        let header = TokenHeader::default();
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| PermsError::EncryptionFailed(e.to_string()))?;
        let header_segment = URL_SAFE_NO_PAD.encode(header_json);

        let ephemeral = EphemeralKeyPair::generate(entropy)?;
        let ephemeral_public = ephemeral.public_key();
        let shared = ephemeral
            .diffie_hellman(recipient)
            .ok_or_else(|| PermsError::EncryptionFailed("recipient key is not usable".into()))?;
        let key = shared.derive_encryption_key(&kdf_context(&ephemeral_public, recipient));

        let nonce = EncryptionNonce::generate(entropy)?;
        let ciphertext = key.encrypt(plaintext, header_segment.as_bytes(), &nonce)?;

        Ok(Self(format!(
            "{}.{}.{}.{}",
            header_segment,
            URL_SAFE_NO_PAD.encode(ephemeral_public.as_bytes()),
            URL_SAFE_NO_PAD.encode(nonce.as_bytes()),
            URL_SAFE_NO_PAD.encode(ciphertext),
        )))
    }

    /// Decrypt with the recipient's secret key.
    ///
    /// Malformed tokens, unknown algorithms, wrong keys and corrupted
    /// ciphertext all fail with [`PermsError::DecryptionFailed`].
    pub fn decrypt(&self, recipient_secret: &X25519StaticSecret) -> Result<Vec<u8>> {
        let parts = TokenParts::parse(&self.0)?;
        let recipient_public = recipient_secret.public_key();

        let shared = recipient_secret
            .diffie_hellman(&parts.ephemeral_public)
            .ok_or_else(|| PermsError::DecryptionFailed("invalid ephemeral key".into()))?;
        let key = shared.derive_encryption_key(&kdf_context(&parts.ephemeral_public, &recipient_public));

        match (parts.header.alg, parts.header.enc) {
            (KeyAgreement::EcdhEsX25519, ContentEncryption::ChaCha20Poly1305) => {
                key.decrypt(&parts.ciphertext, parts.header_segment.as_bytes(), &parts.nonce)
            }
        }
    }

    /// Wrap an existing token string without validating it.
    pub fn from_string(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Parse the header without decrypting.
    pub fn header(&self) -> Result<TokenHeader> {
        Ok(TokenParts::parse(&self.0)?.header)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EncryptedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedToken({} chars)", self.0.len())
    }
}

impl fmt::Display for EncryptedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded segments of a token.
struct TokenParts<'a> {
    header_segment: &'a str,
    header: TokenHeader,
    ephemeral_public: X25519PublicKey,
    nonce: EncryptionNonce,
    ciphertext: Vec<u8>,
}

impl<'a> TokenParts<'a> {
    fn parse(token: &'a str) -> Result<Self> {
        let mut segments = token.split('.');
        let (Some(header_segment), Some(epk), Some(nonce), Some(ciphertext), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(malformed("expected 4 segments"));
        };

        let header_json = decode_segment(header_segment, "header")?;
        let header: TokenHeader = serde_json::from_slice(&header_json)
            .map_err(|e| malformed(&format!("header: {e}")))?;
        if header.v != TOKEN_VERSION {
            return Err(malformed(&format!("unsupported version {}", header.v)));
        }

        let ephemeral_public = X25519PublicKey::from_bytes(
            decode_segment(epk, "ephemeral key")?
                .try_into()
                .map_err(|_| malformed("ephemeral key must be 32 bytes"))?,
        );
        let nonce = EncryptionNonce::from_bytes(
            decode_segment(nonce, "nonce")?
                .try_into()
                .map_err(|_| malformed("nonce must be 12 bytes"))?,
        );
        let ciphertext = decode_segment(ciphertext, "ciphertext")?;

        Ok(Self {
            header_segment,
            header,
            ephemeral_public,
            nonce,
            ciphertext,
        })
    }
}

fn decode_segment(segment: &str, what: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| malformed(&format!("{what}: {e}")))
}

fn malformed(detail: &str) -> PermsError {
    PermsError::DecryptionFailed(format!("malformed token: {detail}"))
}

fn kdf_context(ephemeral: &X25519PublicKey, recipient: &X25519PublicKey) -> [u8; 64] {
    let mut context = [0u8; 64];
    context[..32].copy_from_slice(ephemeral.as_bytes());
    context[32..].copy_from_slice(recipient.as_bytes());
    context
}
