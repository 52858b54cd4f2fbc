//! Error types for the store module.

use sealpost_core::ReportStatus;
use sealpost_perms::PermsError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Report not found.
    #[error("report not found: {0}")]
    NotFound(String),

    /// A record with the same key already exists.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// The stored status does not allow the requested transition.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: ReportStatus, to: ReportStatus },

    /// A write precondition failed against the stored report.
    #[error("write refused: {0}")]
    Refused(#[from] PermsError),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Lock poisoning or a failed blocking task.
    #[error("internal store error: {0}")]
    Internal(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
