//! Integrity fingerprints over encrypted payloads.
//!
//! A fingerprint is a BLAKE3-256 digest in derive-key mode. It is a pure
//! function of its input, so a stored ciphertext can be re-fingerprinted at
//! any time and compared with the value anchored on the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Domain separation context for content fingerprints.
pub const FINGERPRINT_CONTEXT: &str = "sealpost 2024 report content fingerprint v1";

/// Length of a fingerprint rendered as hex.
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// A 32-byte content fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of the given bytes.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(FINGERPRINT_CONTEXT);
        hasher.update(data);
        Self(*hasher.finalize().as_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to the 64-character lowercase hex form stored on the ledger.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s.len() != FINGERPRINT_HEX_LEN {
            return Err(CoreError::InvalidFingerprint(format!(
                "expected {FINGERPRINT_HEX_LEN} hex characters, got {}",
                s.len()
            )));
        }
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidFingerprint(e.to_string()))?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Check whether `data` still hashes to this fingerprint.
    pub fn matches(&self, data: &[u8]) -> bool {
        // Constant-time comparison through blake3's Hash equality.
        blake3::Hash::from(self.0) == blake3::Hash::from(Self::of(data).0)
    }
}

/// Fingerprint an encrypted payload.
pub fn fingerprint(encrypted_payload: &[u8]) -> Fingerprint {
    Fingerprint::of(encrypted_payload)
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
