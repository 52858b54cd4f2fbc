//! The report engine: unified API for secure report exchange.
//!
//! The engine ties together key management, envelope encryption, ledger
//! anchoring, access control and persistence. It holds no report state of
//! its own; every mutation is a single atomic store call, and permission
//! checks on grants, revokes and edits are repeated inside that call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use sealpost_anchor::{AnchorClient, GuardedAnchor};
use sealpost_core::{
    fingerprint, AccessControl, AccessLevel, Clock, Fingerprint, MetadataPatch, NewReport, Report,
    ReportFilter, ReportId, ReportMetadata, ReportStatus, SystemClock, UserId, ViewRecord,
    DEFAULT_CONTENT_TYPE,
};
use sealpost_perms::{
    access_state, can_write, check_grant, check_revoke, AccessState, EncryptedToken, Entropy,
    OsEntropy, PermsError, PrivateKeyMaterial, PublicKeyInfo,
};
use sealpost_store::{KeyRepository, ReportCheck, ReportStore, StoreError};

use crate::config::EngineConfig;
use crate::directory::{UserDirectory, UserRecord};
use crate::error::{EngineError, Result};
use crate::keystore::KeyStore;

/// A report as returned to a reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub report: Report,
    /// How the reader is authorized.
    pub access: AccessState,
    /// Decrypted content; present only when the reader is the recipient.
    pub plaintext: Option<Vec<u8>>,
}

/// Reports a user sent and received, newest report date first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportListing {
    pub sent: Vec<Report>,
    pub received: Vec<Report>,
}

/// Outcome of an integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub report_id: ReportId,
    /// Fingerprint recomputed from the stored ciphertext.
    pub fingerprint: Fingerprint,
    /// Stored ciphertext still matches the stored hash and anchor receipt.
    pub content_hash_matches: bool,
    /// The ledger holds the same fingerprint.
    pub ledger_matches: bool,
    pub tx_ref: String,
    pub checked_at: i64,
}

impl IntegrityReport {
    pub fn is_intact(&self) -> bool {
        self.content_hash_matches && self.ledger_matches
    }
}

/// Builder for [`ReportEngine`].
pub struct EngineBuilder<S> {
    store: Arc<S>,
    anchor: Arc<dyn AnchorClient>,
    directory: Arc<dyn UserDirectory>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn Entropy>,
}

impl<S: ReportStore + KeyRepository> EngineBuilder<S> {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Randomness for key generation and encryption. Defaults to the OS RNG.
    pub fn entropy(mut self, entropy: Arc<dyn Entropy>) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn build(self) -> ReportEngine<S> {
        ReportEngine {
            keys: KeyStore::new(self.store.clone(), self.entropy.clone(), self.clock.clone()),
            anchor: GuardedAnchor::new(self.anchor, self.config.anchor),
            store: self.store,
            directory: self.directory,
            clock: self.clock,
            entropy: self.entropy,
            config: self.config,
        }
    }
}

/// The report engine.
///
/// Provides a unified API for:
/// - Creating reports (encrypt, fingerprint, anchor, persist)
/// - Reading reports (authorize, verify, decrypt for the recipient, audit)
/// - Managing access grants and visibility
/// - Moving reports through their lifecycle
/// - Exporting key material
pub struct ReportEngine<S> {
    store: Arc<S>,
    keys: KeyStore<S>,
    anchor: GuardedAnchor<Arc<dyn AnchorClient>>,
    directory: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn Entropy>,
    config: EngineConfig,
}

impl<S: ReportStore + KeyRepository> ReportEngine<S> {
    /// Start building an engine with the system clock and OS randomness.
    pub fn builder(
        store: Arc<S>,
        anchor: Arc<dyn AnchorClient>,
        directory: Arc<dyn UserDirectory>,
    ) -> EngineBuilder<S> {
        EngineBuilder {
            store,
            anchor,
            directory,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            entropy: Arc::new(OsEntropy),
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Report Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a report from `sender` to `recipient`.
    ///
    /// Content is encrypted for the recipient, fingerprinted and anchored
    /// before anything is persisted. Any failure leaves no report behind.
    pub async fn create_report(
        &self,
        new: NewReport,
        sender: &UserId,
        recipient: &UserId,
    ) -> Result<Report> {
        let new = new.normalized(self.config.max_content_bytes, self.config.max_tags)?;

        self.lookup(sender)
            .await
            .ok_or_else(|| EngineError::SenderNotFound(sender.clone()))?;
        self.lookup(recipient)
            .await
            .ok_or_else(|| EngineError::RecipientNotFound(recipient.clone()))?;

        let recipient_keys = self.keys.ensure_key_pair(recipient).await?;

        let status = new.initial_status();
        let NewReport {
            title,
            description,
            report_type,
            content: mut plaintext,
            tags,
            priority,
            content_type,
            date,
            ..
        } = new;
        let size = plaintext.len() as u64;
        let token = EncryptedToken::encrypt_with(
            &*self.entropy,
            &plaintext,
            &recipient_keys.public_key(),
        );
        plaintext.zeroize();
        let token = token?.into_string();

        let content_hash = fingerprint(token.as_bytes());
        let report_id = ReportId::generate();
        debug!(%report_id, %content_hash, "anchoring report fingerprint");

        let receipt = self.anchor.anchor(&report_id, &content_hash).await?;
        if receipt.fingerprint != content_hash || receipt.report_id != report_id {
            warn!(%report_id, "ledger receipt does not match the submitted fingerprint");
            return Err(EngineError::IntegrityViolation(format!(
                "ledger acknowledged a different fingerprint for report {report_id}"
            )));
        }

        let now = self.clock.now_millis();
        let report = Report {
            report_id,
            title,
            description,
            report_type,
            sender_id: sender.clone(),
            recipient_id: recipient.clone(),
            encrypted_content: token,
            content_hash,
            anchor: receipt,
            metadata: ReportMetadata {
                date: date.unwrap_or(now),
                tags,
                priority,
                size,
                content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            },
            access_control: AccessControl::default(),
            status,
            views: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        self.store.insert_report(&report).await?;
        info!(
            %report_id,
            sender = %sender,
            recipient = %recipient,
            report_type = %report.report_type,
            status = %report.status,
            "report created"
        );
        Ok(report)
    }

    /// Read a report.
    ///
    /// The caller must be authorized. Integrity is verified against the
    /// stored hash and the ledger before anything is returned. Only the
    /// recipient receives plaintext. Every successful read is recorded.
    pub async fn get_report(&self, report_id: &ReportId, caller: &UserId) -> Result<ReportView> {
        let mut report = self.load(report_id).await?;
        let now = self.clock.now_millis();

        let access = access_state(&report, caller, now);
        if !access.is_authorized() {
            warn!(%report_id, caller = %caller, ?access, "read denied");
            return Err(EngineError::AccessDenied(format!(
                "{caller} may not read report {report_id}"
            )));
        }

        self.ensure_intact(&report).await?;

        let plaintext = if report.is_recipient(caller) {
            let keys = self.keys.key_pair(caller).await?;
            let token = EncryptedToken::from_string(report.encrypted_content.clone());
            Some(token.decrypt(keys.secret_key())?)
        } else {
            None
        };

        let view = ViewRecord {
            user_id: caller.clone(),
            viewed_at: now,
        };
        self.store.append_view(report_id, &view).await?;
        report.views.push(view);

        debug!(%report_id, caller = %caller, decrypted = plaintext.is_some(), "report read");
        Ok(ReportView {
            report,
            access,
            plaintext,
        })
    }

    /// List reports a user sent and received.
    ///
    /// No decryption and no view tracking.
    pub async fn list_reports(&self, user: &UserId, filter: &ReportFilter) -> Result<ReportListing> {
        let mut sent = self.store.reports_sent_by(user).await?;
        let mut received = self.store.reports_received_by(user).await?;

        sent.retain(|r| filter.matches(r));
        received.retain(|r| filter.matches(r));
        sort_newest_first(&mut sent);
        sort_newest_first(&mut received);

        Ok(ReportListing { sent, received })
    }

    /// Check stored content and ledger without reading content.
    ///
    /// Mismatches are reported, not raised. Ledger outages still fail with
    /// `AnchorUnavailable`.
    pub async fn verify_integrity(
        &self,
        report_id: &ReportId,
        caller: &UserId,
    ) -> Result<IntegrityReport> {
        let report = self.load(report_id).await?;
        let now = self.clock.now_millis();
        self.require_read(&report, caller, now)?;

        let computed = fingerprint(report.encrypted_content.as_bytes());
        let content_hash_matches =
            computed == report.content_hash && report.anchor.fingerprint == report.content_hash;

        let ledger_matches = match self.anchor.verify(report_id, &report.content_hash).await {
            Ok(matches) => matches,
            Err(e) if e.is_transient() => return Err(e.into()),
            Err(e) => {
                warn!(%report_id, error = %e, "ledger verification failed");
                false
            }
        };

        if !(content_hash_matches && ledger_matches) {
            warn!(%report_id, content_hash_matches, ledger_matches, "integrity check failed");
        }

        Ok(IntegrityReport {
            report_id: *report_id,
            fingerprint: computed,
            content_hash_matches,
            ledger_matches,
            tx_ref: report.anchor.tx_ref,
            checked_at: now,
        })
    }

    /// The view log. Owners only.
    pub async fn views(&self, report_id: &ReportId, caller: &UserId) -> Result<Vec<ViewRecord>> {
        let report = self.load(report_id).await?;
        require_owner(&report, caller, "read the view log of")?;
        Ok(report.views)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Access Control
    // ─────────────────────────────────────────────────────────────────────────

    /// Grant `target` access to a report, replacing any earlier grant.
    ///
    /// The granter must be an owner or hold a live `Admin` grant, and only
    /// owners may grant `Admin`.
    pub async fn grant_access(
        &self,
        report_id: &ReportId,
        granter: &UserId,
        target: &UserId,
        level: AccessLevel,
        expires_at: Option<i64>,
    ) -> Result<Report> {
        let report = self.load(report_id).await?;
        let now = self.clock.now_millis();

        let grant = check_grant(&report, granter, target, level, expires_at, now).map_err(|e| {
            warn!(%report_id, granter = %granter, target = %target, error = %e, "grant refused");
            EngineError::from(e)
        })?;
        self.lookup(target)
            .await
            .ok_or_else(|| EngineError::UserNotFound(target.clone()))?;

        let check: ReportCheck = {
            let (granter, target) = (granter.clone(), target.clone());
            Arc::new(move |stored: &Report| {
                check_grant(stored, &granter, &target, level, expires_at, now).map(drop)
            })
        };
        let updated = self
            .store
            .put_grant(report_id, &grant, now, check)
            .await
            .map_err(|e| refused_at_write(report_id, granter, "grant", e))?;
        info!(
            %report_id,
            granter = %granter,
            target = %target,
            level = %level,
            expires_at = ?expires_at,
            "access granted"
        );
        Ok(updated)
    }

    /// Revoke `target`'s grant. Takes effect immediately.
    pub async fn revoke_access(
        &self,
        report_id: &ReportId,
        granter: &UserId,
        target: &UserId,
    ) -> Result<Report> {
        let report = self.load(report_id).await?;
        let now = self.clock.now_millis();

        check_revoke(&report, granter, target, now).map_err(|e| {
            warn!(%report_id, granter = %granter, target = %target, error = %e, "revoke refused");
            EngineError::from(e)
        })?;

        let check: ReportCheck = {
            let (granter, target) = (granter.clone(), target.clone());
            Arc::new(move |stored: &Report| check_revoke(stored, &granter, &target, now))
        };
        let removed = self
            .store
            .remove_grant(report_id, target, now, check)
            .await
            .map_err(|e| refused_at_write(report_id, granter, "revoke", e))?;
        if !removed {
            return Err(EngineError::InvalidOperation(format!(
                "no grant for {target} on report {report_id}"
            )));
        }
        info!(%report_id, granter = %granter, target = %target, "access revoked");
        self.load(report_id).await
    }

    /// Make a report readable by everyone, or not. Owners only.
    pub async fn set_public(
        &self,
        report_id: &ReportId,
        caller: &UserId,
        is_public: bool,
    ) -> Result<Report> {
        let report = self.load(report_id).await?;
        require_owner(&report, caller, "change visibility of")?;

        let updated = self
            .store
            .set_public(report_id, is_public, self.clock.now_millis())
            .await?;
        info!(%report_id, caller = %caller, is_public, "visibility changed");
        Ok(updated)
    }

    /// Change tags, priority or report date. Never touches content.
    pub async fn update_metadata(
        &self,
        report_id: &ReportId,
        caller: &UserId,
        patch: &MetadataPatch,
    ) -> Result<Report> {
        if patch.is_empty() {
            return Err(EngineError::InvalidInput("metadata patch is empty".into()));
        }

        let report = self.load(report_id).await?;
        let now = self.clock.now_millis();
        if !can_write(&report, caller, now) {
            warn!(%report_id, caller = %caller, "metadata update denied");
            return Err(EngineError::AccessDenied(format!(
                "{caller} may not edit report {report_id}"
            )));
        }

        let mut preview = report.metadata.clone();
        patch.apply(&mut preview);
        if preview.tags.len() > self.config.max_tags {
            return Err(EngineError::InvalidInput(format!(
                "{} tags given, limit is {}",
                preview.tags.len(),
                self.config.max_tags
            )));
        }

        let check: ReportCheck = {
            let caller = caller.clone();
            Arc::new(move |stored: &Report| {
                if can_write(stored, &caller, now) {
                    Ok(())
                } else {
                    Err(PermsError::PermissionDenied(format!(
                        "{caller} may not edit report {}",
                        stored.report_id
                    )))
                }
            })
        };
        let updated = self
            .store
            .update_metadata(report_id, patch, now, check)
            .await
            .map_err(|e| refused_at_write(report_id, caller, "metadata update", e))?;
        info!(%report_id, caller = %caller, "metadata updated");
        Ok(updated)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Move a report to `next`. Sender or recipient only.
    pub async fn update_status(
        &self,
        report_id: &ReportId,
        caller: &UserId,
        next: ReportStatus,
    ) -> Result<Report> {
        let report = self.load(report_id).await?;
        require_owner(&report, caller, "change the status of")?;

        let updated = self
            .store
            .update_status(report_id, next, self.clock.now_millis())
            .await?;
        info!(
            %report_id,
            caller = %caller,
            from = %report.status,
            to = %updated.status,
            "status changed"
        );
        Ok(updated)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key Material
    // ─────────────────────────────────────────────────────────────────────────

    /// Make sure a registered user has a keypair; returns its public half.
    pub async fn ensure_key_pair(&self, user: &UserId) -> Result<PublicKeyInfo> {
        self.lookup(user)
            .await
            .ok_or_else(|| EngineError::UserNotFound(user.clone()))?;
        Ok(self.keys.ensure_key_pair(user).await?.public_info())
    }

    /// Public key of a user.
    pub async fn export_public_key(&self, user: &UserId) -> Result<PublicKeyInfo> {
        Ok(self.keys.key_pair(user).await?.public_info())
    }

    /// Private key of a user, for that user only.
    pub async fn export_private_key(
        &self,
        caller: &UserId,
        user: &UserId,
    ) -> Result<PrivateKeyMaterial> {
        let key = self.keys.export_private(caller, user).await;
        if key.is_err() {
            warn!(caller = %caller, user = %user, "private key export refused");
        }
        key
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn load(&self, report_id: &ReportId) -> Result<Report> {
        self.store
            .get_report(report_id)
            .await?
            .ok_or_else(|| EngineError::ReportNotFound(report_id.to_hex()))
    }

    async fn lookup(&self, user: &UserId) -> Option<UserRecord> {
        self.directory.lookup_user(user).await
    }

    fn require_read(&self, report: &Report, caller: &UserId, now: i64) -> Result<()> {
        if access_state(report, caller, now).is_authorized() {
            Ok(())
        } else {
            warn!(report_id = %report.report_id, caller = %caller, "access denied");
            Err(EngineError::AccessDenied(format!(
                "{caller} may not read report {}",
                report.report_id
            )))
        }
    }

    /// Stored content, stored hash and ledger must all agree.
    async fn ensure_intact(&self, report: &Report) -> Result<()> {
        let report_id = report.report_id;

        if !report.content_hash_matches() || report.anchor.fingerprint != report.content_hash {
            warn!(%report_id, "stored content does not match its fingerprint");
            return Err(EngineError::IntegrityViolation(format!(
                "stored content of report {report_id} does not match its fingerprint"
            )));
        }

        match self.anchor.verify(&report_id, &report.content_hash).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!(%report_id, "ledger fingerprint mismatch");
                Err(EngineError::IntegrityViolation(format!(
                    "ledger fingerprint for report {report_id} does not match"
                )))
            }
            Err(e) => {
                warn!(%report_id, error = %e, "ledger verification failed");
                Err(e.into())
            }
        }
    }
}

fn require_owner(report: &Report, caller: &UserId, action: &str) -> Result<()> {
    if report.is_owner(caller) {
        Ok(())
    } else {
        warn!(report_id = %report.report_id, caller = %caller, action, "owner-only operation denied");
        Err(EngineError::AccessDenied(format!(
            "{caller} may not {action} report {}",
            report.report_id
        )))
    }
}

/// Log a write whose permission no longer held once it reached the store.
fn refused_at_write(
    report_id: &ReportId,
    caller: &UserId,
    action: &str,
    e: StoreError,
) -> EngineError {
    if let StoreError::Refused(reason) = &e {
        warn!(
            %report_id,
            caller = %caller,
            action,
            %reason,
            "write refused against current report state"
        );
    }
    e.into()
}

fn sort_newest_first(reports: &mut [Report]) {
    reports.sort_by(|a, b| {
        b.metadata
            .date
            .cmp(&a.metadata.date)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}
