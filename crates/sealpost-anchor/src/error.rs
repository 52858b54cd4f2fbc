//! Error types for the anchor module.

use std::time::Duration;

use sealpost_core::ReportId;
use thiserror::Error;

/// Errors that can occur while talking to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnchorError {
    /// The ledger could not be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The ledger did not answer within the configured bound.
    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),

    /// The ledger refused the request.
    #[error("ledger rejected request: {0}")]
    Rejected(String),

    /// No fingerprint is anchored for the report.
    #[error("report {0} is not anchored")]
    NotAnchored(ReportId),
}

impl AnchorError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AnchorError::Unavailable(_) | AnchorError::Timeout(_))
    }
}

/// Result type for anchor operations.
pub type Result<T> = std::result::Result<T, AnchorError>;
