//! Error types for the report engine.

use sealpost_anchor::AnchorError;
use sealpost_core::{CoreError, ReportStatus, UserId};
use sealpost_perms::PermsError;
use sealpost_store::StoreError;
use thiserror::Error;

/// Errors that can occur during engine operations.
///
/// Cryptographic and integrity failures are terminal. Only
/// [`EngineError::AnchorUnavailable`] is worth retrying.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Key material could not be generated.
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Content could not be encrypted.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Content could not be decrypted with the caller's key.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Stored content, stored hash and ledger disagree.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// The ledger could not be reached in time.
    #[error("anchor unavailable: {0}")]
    AnchorUnavailable(String),

    /// The ledger refused the request.
    #[error("anchor rejected: {0}")]
    AnchorRejected(String),

    /// Caller is not authorized.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Recipient unknown to the user directory.
    #[error("recipient not found: {0}")]
    RecipientNotFound(UserId),

    /// Sender unknown to the user directory.
    #[error("sender not found: {0}")]
    SenderNotFound(UserId),

    /// User unknown to the user directory.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// No report with this ID.
    #[error("report not found: {0}")]
    ReportNotFound(String),

    /// The lifecycle does not allow this status change.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: ReportStatus, to: ReportStatus },

    /// Malformed or out-of-bounds input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Well-formed request that the access model does not allow.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The user has no key material.
    #[error("no key material for {0}")]
    KeyNotFound(UserId),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl EngineError {
    /// Whether the same call may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::AnchorUnavailable(_))
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => EngineError::ReportNotFound(what),
            StoreError::InvalidTransition { from, to } => EngineError::InvalidTransition { from, to },
            StoreError::Refused(reason) => reason.into(),
            other => EngineError::Store(other),
        }
    }
}

impl From<PermsError> for EngineError {
    fn from(e: PermsError) -> Self {
        match e {
            PermsError::KeyGenerationFailed(msg) => EngineError::KeyGenerationFailed(msg),
            PermsError::EncryptionFailed(msg) => EngineError::EncryptionFailed(msg),
            PermsError::DecryptionFailed(msg) => EngineError::DecryptionFailed(msg),
            PermsError::PermissionDenied(msg) => EngineError::AccessDenied(msg),
            e @ (PermsError::ImplicitOwner(_)
            | PermsError::GrantNotFound(_)
            | PermsError::InvalidGrant(_)) => EngineError::InvalidOperation(e.to_string()),
            PermsError::InvalidKey(msg) => EngineError::InvalidInput(msg),
        }
    }
}

impl From<AnchorError> for EngineError {
    fn from(e: AnchorError) -> Self {
        match e {
            AnchorError::Unavailable(_) | AnchorError::Timeout(_) => {
                EngineError::AnchorUnavailable(e.to_string())
            }
            AnchorError::Rejected(msg) => EngineError::AnchorRejected(msg),
            AnchorError::NotAnchored(_) => EngineError::IntegrityViolation(e.to_string()),
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidTransition { from, to } => EngineError::InvalidTransition { from, to },
            other => EngineError::InvalidInput(other.to_string()),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
