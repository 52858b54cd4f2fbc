//! Anchor client abstraction.
//!
//! The ledger stores one fingerprint per report and answers whether a
//! fingerprint matches what it holds. Implementations may talk to a
//! blockchain node, a notary service, or stay in memory.

use std::sync::Arc;

use async_trait::async_trait;
use sealpost_core::{AnchorReceipt, Fingerprint, ReportId};

use crate::error::Result;

/// Client for an external, append-only ledger of report fingerprints.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait AnchorClient: Send + Sync {
    /// Register `fingerprint` for `report_id`.
    async fn anchor(&self, report_id: &ReportId, fingerprint: &Fingerprint) -> Result<AnchorReceipt>;

    /// Check `fingerprint` against the value anchored for `report_id`.
    ///
    /// Returns `Ok(false)` on mismatch and `NotAnchored` when the ledger has
    /// no entry for the report.
    async fn verify(&self, report_id: &ReportId, fingerprint: &Fingerprint) -> Result<bool>;
}

#[async_trait]
impl<T: AnchorClient + ?Sized> AnchorClient for Arc<T> {
    async fn anchor(&self, report_id: &ReportId, fingerprint: &Fingerprint) -> Result<AnchorReceipt> {
        (**self).anchor(report_id, fingerprint).await
    }

    async fn verify(&self, report_id: &ReportId, fingerprint: &Fingerprint) -> Result<bool> {
        (**self).verify(report_id, fingerprint).await
    }
}
