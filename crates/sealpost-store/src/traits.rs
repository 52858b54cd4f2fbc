//! Store traits: the abstract interface for report and key persistence.
//!
//! These traits keep the engine storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).
//!
//! Every mutating method is a single atomic step against one report, so two
//! concurrent callers never lose each other's writes.

use std::sync::Arc;

use async_trait::async_trait;
use sealpost_core::{
    AuthorizedUser, MetadataPatch, Report, ReportId, ReportStatus, UserId, ViewRecord,
};
use sealpost_perms::{PermsError, UserKeyPair};

use crate::error::Result;

/// Precondition evaluated against the stored report inside a mutation's
/// atomic section. A refusal aborts the write with [`StoreError::Refused`].
///
/// [`StoreError::Refused`]: crate::StoreError::Refused
pub type ReportCheck = Arc<dyn Fn(&Report) -> std::result::Result<(), PermsError> + Send + Sync>;

/// Async interface for report persistence.
///
/// # Design Notes
///
/// - **No deletes**: reports are archived through their status.
/// - **One grant per user**: [`ReportStore::put_grant`] replaces any existing
///   entry for the same user.
/// - **Append-only views**: [`ReportStore::append_view`] never rewrites
///   earlier entries.
/// - Mutations that touch report state bump `updated_at`; view tracking does not.
/// - **Checked writes**: grant, revoke and metadata writes take a
///   [`ReportCheck`] that sees the report as stored at the time of the write,
///   so a permission revoked in between is honored.
#[async_trait]
pub trait ReportStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Report Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new report. Fails with `Duplicate` if the ID is taken.
    async fn insert_report(&self, report: &Report) -> Result<()>;

    /// Get a report by ID, including its grants and views.
    async fn get_report(&self, id: &ReportId) -> Result<Option<Report>>;

    /// All reports sent by `user`.
    async fn reports_sent_by(&self, user: &UserId) -> Result<Vec<Report>>;

    /// All reports addressed to `user`.
    async fn reports_received_by(&self, user: &UserId) -> Result<Vec<Report>>;

    /// Number of stored reports.
    async fn report_count(&self) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Access Control
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace the grant for `grant.user_id` if `check` accepts the
    /// stored report.
    async fn put_grant(
        &self,
        id: &ReportId,
        grant: &AuthorizedUser,
        now: i64,
        check: ReportCheck,
    ) -> Result<Report>;

    /// Remove the grant for `user` if `check` accepts the stored report.
    /// Returns whether one existed.
    async fn remove_grant(
        &self,
        id: &ReportId,
        user: &UserId,
        now: i64,
        check: ReportCheck,
    ) -> Result<bool>;

    /// Set the public flag.
    async fn set_public(&self, id: &ReportId, is_public: bool, now: i64) -> Result<Report>;

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Move the report to `next`, validated against the stored status.
    ///
    /// Returns `InvalidTransition` if the edge is not allowed from the status
    /// the store holds at the time of the write.
    async fn update_status(&self, id: &ReportId, next: ReportStatus, now: i64) -> Result<Report>;

    /// Apply a metadata patch if `check` accepts the stored report.
    async fn update_metadata(
        &self,
        id: &ReportId,
        patch: &MetadataPatch,
        now: i64,
        check: ReportCheck,
    ) -> Result<Report>;

    /// Append an entry to the view log.
    async fn append_view(&self, id: &ReportId, view: &ViewRecord) -> Result<()>;
}

/// Async interface for per-user key material.
#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// Store `pair` unless the user already has a keypair.
    ///
    /// Returns whichever keypair is stored once the call completes; an
    /// existing keypair is never overwritten.
    async fn insert_keypair_if_absent(&self, pair: &UserKeyPair) -> Result<UserKeyPair>;

    /// Get the user's active keypair.
    async fn get_keypair(&self, user: &UserId) -> Result<Option<UserKeyPair>>;

    /// Replace both halves of the user's keypair in one step, recording
    /// `now` as the replacement time.
    ///
    /// Fails with `NotFound` if the user has no keypair yet.
    async fn replace_keypair(&self, pair: &UserKeyPair, now: i64) -> Result<()>;
}
