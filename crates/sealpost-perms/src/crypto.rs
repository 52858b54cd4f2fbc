//! Primitives behind report envelopes: X25519 agreement, BLAKE3 key
//! derivation and ChaCha20-Poly1305 sealing.
//!
//! Every random draw goes through an [`Entropy`] source and can fail; callers
//! surface those failures instead of falling back to weaker material.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::{PermsError, Result};

/// Key derivation context for envelope keys.
const ENVELOPE_KDF_CONTEXT: &str = "sealpost-perms-v1 envelope key";

/// Error reported by an [`Entropy`] source.
pub use rand::Error as EntropyError;

/// A source of cryptographic randomness.
pub trait Entropy: Send + Sync {
    /// Fill `buf` with random bytes.
    fn fill(&self, buf: &mut [u8]) -> std::result::Result<(), EntropyError>;
}

/// Operating-system randomness.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl Entropy for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> std::result::Result<(), EntropyError> {
        OsRng.try_fill_bytes(buf)
    }
}

/// A user's or an envelope's X25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the 64-character hex form.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| PermsError::InvalidKey(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PermsError::InvalidKey("public key must be 32 bytes".into()))?;
        Ok(Self(arr))
    }

    pub fn to_dalek(&self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

impl fmt::Debug for X25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519Pub({})", &self.to_hex()[..16])
    }
}

/// The long-lived half of a user's keypair.
///
/// Zeroized on drop. `Debug` never prints key material.
#[derive(Clone)]
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    /// Generate a new random secret from the given entropy source.
    pub fn generate(entropy: &dyn Entropy) -> Result<Self> {
        let mut bytes = [0u8; 32];
        entropy
            .fill(&mut bytes)
            .map_err(|e| PermsError::KeyGenerationFailed(e.to_string()))?;
        let secret = Self(StaticSecret::from(bytes));
        bytes.zeroize();
        Ok(secret)
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Export the raw secret bytes (for persistence only).
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }

    /// `None` for low-order peer keys, which would yield an all-zero secret.
    pub fn diffie_hellman(&self, peer_public: &X25519PublicKey) -> Option<SharedKey> {
        let shared = self.0.diffie_hellman(&peer_public.to_dalek());
        shared
            .was_contributory()
            .then(|| SharedKey(*shared.as_bytes()))
    }
}

impl fmt::Debug for X25519StaticSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519Secret({:?}, <redacted>)", self.public_key())
    }
}

/// Raw X25519 agreement output. Never used as a key directly.
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// BLAKE3 derive-key mode gives domain separation; `context` binds the
    /// key to the envelope's public keys.
    pub fn derive_encryption_key(&self, context: &[u8]) -> EncryptionKey {
        let mut hasher = blake3::Hasher::new_derive_key(ENVELOPE_KDF_CONTEXT);
        hasher.update(&self.0);
        hasher.update(context);
        EncryptionKey(*hasher.finalize().as_bytes())
    }
}

impl Drop for SharedKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Per-envelope ChaCha20-Poly1305 key.
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt data with this key, authenticating `aad` alongside it.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| PermsError::EncryptionFailed(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .encrypt(nonce, Payload { msg: plaintext, aad })
            .map_err(|e| PermsError::EncryptionFailed(e.to_string()))
    }

    /// Open a sealed buffer; fails on any tag or `aad` mismatch.
    pub fn decrypt(&self, ciphertext: &[u8], aad: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| PermsError::DecryptionFailed(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .decrypt(nonce, Payload { msg: ciphertext, aad })
            .map_err(|_| PermsError::DecryptionFailed("authentication failed".into()))
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// ChaCha20-Poly1305 nonce, fresh per envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    pub fn generate(entropy: &dyn Entropy) -> Result<Self> {
        let mut bytes = [0u8; 12];
        entropy
            .fill(&mut bytes)
            .map_err(|e| PermsError::EncryptionFailed(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// Sender-side key used for exactly one envelope.
pub struct EphemeralKeyPair {
    secret: X25519StaticSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    pub fn generate(entropy: &dyn Entropy) -> Result<Self> {
        let secret = X25519StaticSecret::generate(entropy)
            .map_err(|e| PermsError::EncryptionFailed(e.to_string()))?;
        let public = secret.public_key();
        Ok(Self { secret, public })
    }

    /// Get the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        self.public
    }

    /// Agree with the recipient key, consuming the secret.
    pub fn diffie_hellman(self, peer_public: &X25519PublicKey) -> Option<SharedKey> {
        self.secret.diffie_hellman(peer_public)
    }
}
