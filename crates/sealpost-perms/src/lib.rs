//! # Sealpost Permissions
//!
//! Key material, envelope encryption and access control for reports.
//!
//! ## Encryption Model
//!
//! Every user holds one X25519 keypair. Report content is encrypted for the
//! recipient only:
//!
//! 1. An ephemeral X25519 key agrees a shared secret with the recipient key
//! 2. BLAKE3 derives a ChaCha20-Poly1305 key bound to both public keys
//! 3. The result is a compact, self-describing [`EncryptedToken`]
//!
//! Senders and ACL grantees can see metadata but never decrypt content.
//!
//! ## Access Model
//!
//! See [`acl`]: implicit owners, explicit expiring grants, and a public flag.

pub mod acl;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod keys;

pub use acl::{
    access_state, apply_grant, apply_revoke, authorize, can_manage, can_write, check_grant,
    check_revoke, AccessState,
};
pub use crypto::{
    EncryptionKey, EncryptionNonce, Entropy, EntropyError, EphemeralKeyPair, OsEntropy, SharedKey,
    X25519PublicKey, X25519StaticSecret,
};
pub use envelope::{EncryptedToken, TokenHeader, TOKEN_VERSION};
pub use error::{PermsError, Result};
pub use keys::{PrivateKeyMaterial, PublicKeyMaterial, PublicKeyInfo, UserKeyPair, KEY_ALGORITHM};
