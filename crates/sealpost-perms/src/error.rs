//! Error types for the permissions module.

use sealpost_core::UserId;
use thiserror::Error;

/// Errors that can occur during key, envelope and access-control operations.
#[derive(Debug, Error)]
pub enum PermsError {
    /// Key material could not be generated. Never replaced by placeholder keys.
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Encryption error.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Malformed token, wrong key or corrupted ciphertext.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Sender and recipient hold structural access that cannot be granted or revoked.
    #[error("{0} is an implicit owner of the report")]
    ImplicitOwner(UserId),

    /// No grant exists for the user.
    #[error("no grant for {0}")]
    GrantNotFound(UserId),

    /// Invalid grant request.
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    /// Stored key material is inconsistent or unreadable.
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
