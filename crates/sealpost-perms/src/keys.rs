//! Per-user encryption key material.
//!
//! Each user owns exactly one active X25519 keypair. The public half is safe to
//! hand to any party that wants to encrypt for the user; the secret half is
//! only ever read on behalf of its owner.

use serde::{Deserialize, Serialize};
use std::fmt;

use sealpost_core::UserId;

use crate::crypto::{Entropy, X25519PublicKey, X25519StaticSecret};
use crate::error::{PermsError, Result};

/// Public key material as exposed to other parties.
pub type PublicKeyMaterial = X25519PublicKey;

/// Private key material; only returned to its owner.
pub type PrivateKeyMaterial = X25519StaticSecret;

/// A user's active keypair.
#[derive(Clone)]
pub struct UserKeyPair {
    user_id: UserId,
    public: X25519PublicKey,
    secret: X25519StaticSecret,
    created_at: i64,
}

impl UserKeyPair {
    /// Generate a fresh keypair for `user_id`.
    ///
    /// Fails with [`PermsError::KeyGenerationFailed`] when entropy is unavailable.
    pub fn generate(user_id: UserId, entropy: &dyn Entropy, now: i64) -> Result<Self> {
        let secret = X25519StaticSecret::generate(entropy)?;
        Ok(Self {
            user_id,
            public: secret.public_key(),
            secret,
            created_at: now,
        })
    }

    /// Rebuild a keypair from persisted parts.
    ///
    /// The stored public key must match the one derived from the secret.
    pub fn from_parts(
        user_id: UserId,
        public: X25519PublicKey,
        secret_bytes: [u8; 32],
        created_at: i64,
    ) -> Result<Self> {
        let secret = X25519StaticSecret::from_bytes(secret_bytes);
        if secret.public_key() != public {
            return Err(PermsError::InvalidKey(format!(
                "stored public key for {user_id} does not match its secret"
            )));
        }
        Ok(Self {
            user_id,
            public,
            secret,
            created_at,
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn public_key(&self) -> PublicKeyMaterial {
        self.public
    }

    pub fn secret_key(&self) -> &PrivateKeyMaterial {
        &self.secret
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// The shareable view of this keypair.
    pub fn public_info(&self) -> PublicKeyInfo {
        PublicKeyInfo {
            user_id: self.user_id.clone(),
            public_key: self.public.to_hex(),
            algorithm: KEY_ALGORITHM.to_string(),
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for UserKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserKeyPair")
            .field("user_id", &self.user_id)
            .field("public", &self.public)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Algorithm label published with public keys.
pub const KEY_ALGORITHM: &str = "X25519";

/// Serializable public half of a user's key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyInfo {
    pub user_id: UserId,
    /// Hex-encoded 32-byte public key.
    pub public_key: String,
    pub algorithm: String,
    pub created_at: i64,
}
