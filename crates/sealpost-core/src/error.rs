//! Error types for Sealpost core.

use thiserror::Error;

use crate::status::ReportStatus;

/// Errors raised by core model operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: ReportStatus, to: ReportStatus },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
