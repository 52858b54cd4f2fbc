//! # Sealpost Core
//!
//! Pure model for Sealpost: reports, identifiers, fingerprints and the
//! report lifecycle.
//!
//! This crate contains no I/O, no storage, no networking and no encryption.
//!
//! ## Key Types
//!
//! - [`Report`] - The persisted report entity
//! - [`ReportId`] / [`UserId`] - Identifiers
//! - [`Fingerprint`] - Deterministic digest of an encrypted payload
//! - [`ReportStatus`] - Lifecycle state machine
//! - [`Clock`] - Time source used for grant expiry and audit timestamps

pub mod clock;
pub mod error;
pub mod fingerprint;
pub mod report;
pub mod status;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, Result};
pub use fingerprint::{fingerprint, Fingerprint, FINGERPRINT_HEX_LEN};
pub use report::{
    AccessControl, AccessLevel, AnchorReceipt, AuthorizedUser, MetadataPatch, NewReport, Priority,
    Report, ReportFilter, ReportMetadata, ReportType, ViewRecord, DEFAULT_CONTENT_TYPE,
};
pub use status::ReportStatus;
pub use types::{ReportId, UserId};
