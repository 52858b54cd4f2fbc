//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via `tokio::task::spawn_blocking`. Each trait call runs
//! in one transaction on the shared connection.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use sealpost_core::{
    AccessControl, AnchorReceipt, AuthorizedUser, Fingerprint, MetadataPatch, Report, ReportId,
    ReportMetadata, ReportStatus, UserId, ViewRecord,
};
use sealpost_perms::{UserKeyPair, X25519PublicKey};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{KeyRepository, ReportCheck, ReportStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Internal(format!("mutex poisoned: {e}")))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("spawn_blocking failed: {e}")))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

const REPORT_COLUMNS: &str = "report_id, title, description, report_type, sender_id, recipient_id,
     encrypted_content, content_hash, anchor_fingerprint, anchor_tx_ref, anchored_at,
     metadata, is_public, status, created_at, updated_at";

/// Raw column values of a `reports` row.
struct ReportRow {
    report_id: Vec<u8>,
    title: String,
    description: String,
    report_type: String,
    sender_id: String,
    recipient_id: String,
    encrypted_content: String,
    content_hash: String,
    anchor_fingerprint: String,
    anchor_tx_ref: String,
    anchored_at: i64,
    metadata: String,
    is_public: bool,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl ReportRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            report_id: row.get("report_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            report_type: row.get("report_type")?,
            sender_id: row.get("sender_id")?,
            recipient_id: row.get("recipient_id")?,
            encrypted_content: row.get("encrypted_content")?,
            content_hash: row.get("content_hash")?,
            anchor_fingerprint: row.get("anchor_fingerprint")?,
            anchor_tx_ref: row.get("anchor_tx_ref")?,
            anchored_at: row.get("anchored_at")?,
            metadata: row.get("metadata")?,
            is_public: row.get("is_public")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_report(self, grants: Vec<AuthorizedUser>, views: Vec<ViewRecord>) -> Result<Report> {
        let report_id = ReportId::from_bytes(
            self.report_id
                .try_into()
                .map_err(|_| StoreError::InvalidData("report_id must be 16 bytes".into()))?,
        );
        let metadata: ReportMetadata = serde_json::from_str(&self.metadata)
            .map_err(|e| StoreError::Serialization(format!("metadata: {e}")))?;

        Ok(Report {
            report_id,
            title: self.title,
            description: self.description,
            report_type: self.report_type.parse().map_err(invalid)?,
            sender_id: UserId::new(self.sender_id).map_err(invalid)?,
            recipient_id: UserId::new(self.recipient_id).map_err(invalid)?,
            encrypted_content: self.encrypted_content,
            content_hash: Fingerprint::from_hex(&self.content_hash).map_err(invalid)?,
            anchor: AnchorReceipt {
                report_id,
                fingerprint: Fingerprint::from_hex(&self.anchor_fingerprint).map_err(invalid)?,
                tx_ref: self.anchor_tx_ref,
                anchored_at: self.anchored_at,
            },
            metadata,
            access_control: AccessControl {
                is_public: self.is_public,
                authorized_users: grants,
            },
            status: self.status.parse().map_err(invalid)?,
            views,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn invalid(e: impl std::fmt::Display) -> StoreError {
    StoreError::InvalidData(e.to_string())
}

fn load_grants(conn: &Connection, id: &[u8]) -> Result<Vec<AuthorizedUser>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, access_level, granted_at, expires_at FROM report_grants
         WHERE report_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map(params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(user_id, level, granted_at, expires_at)| {
            Ok(AuthorizedUser {
                user_id: UserId::new(user_id).map_err(invalid)?,
                access_level: level.parse().map_err(invalid)?,
                granted_at,
                expires_at,
            })
        })
        .collect()
}

fn load_views(conn: &Connection, id: &[u8]) -> Result<Vec<ViewRecord>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, viewed_at FROM report_views WHERE report_id = ?1 ORDER BY view_id",
    )?;
    let rows = stmt
        .query_map(params![id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(user_id, viewed_at)| {
            Ok(ViewRecord {
                user_id: UserId::new(user_id).map_err(invalid)?,
                viewed_at,
            })
        })
        .collect()
}

fn load_report(conn: &Connection, id: &ReportId) -> Result<Option<Report>> {
    let row = conn
        .query_row(
            &format!("SELECT {REPORT_COLUMNS} FROM reports WHERE report_id = ?1"),
            params![id.as_bytes().as_slice()],
            ReportRow::from_row,
        )
        .optional()?;

    match row {
        Some(row) => {
            let grants = load_grants(conn, id.as_bytes())?;
            let views = load_views(conn, id.as_bytes())?;
            row.into_report(grants, views).map(Some)
        }
        None => Ok(None),
    }
}

fn require_report(conn: &Connection, id: &ReportId) -> Result<Report> {
    load_report(conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_hex()))
}

fn load_reports_where(conn: &Connection, column: &str, user: &UserId) -> Result<Vec<Report>> {
    let rows = {
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE {column} = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt
            .query_map(params![user.as_str()], ReportRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    rows.into_iter()
        .map(|row| {
            let grants = load_grants(conn, &row.report_id)?;
            let views = load_views(conn, &row.report_id)?;
            row.into_report(grants, views)
        })
        .collect()
}

fn touch(conn: &Connection, id: &ReportId, now: i64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE reports SET updated_at = ?2 WHERE report_id = ?1",
        params![id.as_bytes().as_slice(), now],
    )?;
    if updated == 0 {
        return Err(StoreError::NotFound(id.to_hex()));
    }
    Ok(())
}

/// Binary key record stored in `user_keys.key_record`.
#[derive(Serialize, Deserialize)]
struct KeyRecord {
    version: u8,
    public: [u8; 32],
    secret: [u8; 32],
    created_at: i64,
}

impl Drop for KeyRecord {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

const KEY_RECORD_VERSION: u8 = 1;

fn encode_key_record(pair: &UserKeyPair) -> Result<Vec<u8>> {
    let record = KeyRecord {
        version: KEY_RECORD_VERSION,
        public: *pair.public_key().as_bytes(),
        secret: pair.secret_key().to_bytes(),
        created_at: pair.created_at(),
    };
    let mut buf = Vec::new();
    ciborium::into_writer(&record, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_key_record(user_id: String, bytes: &[u8]) -> Result<UserKeyPair> {
    let record: KeyRecord =
        ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
    if record.version != KEY_RECORD_VERSION {
        return Err(StoreError::InvalidData(format!(
            "unsupported key record version {}",
            record.version
        )));
    }
    let user_id = UserId::new(user_id).map_err(invalid)?;
    UserKeyPair::from_parts(
        user_id,
        X25519PublicKey::from_bytes(record.public),
        record.secret,
        record.created_at,
    )
    .map_err(invalid)
}

fn load_keypair(conn: &Connection, user: &str) -> Result<Option<UserKeyPair>> {
    let row: Option<Vec<u8>> = conn
        .query_row(
            "SELECT key_record FROM user_keys WHERE user_id = ?1",
            params![user],
            |row| row.get(0),
        )
        .optional()?;
    row.map(|bytes| decode_key_record(user.to_string(), &bytes))
        .transpose()
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait implementations
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ReportStore for SqliteStore {
    async fn insert_report(&self, report: &Report) -> Result<()> {
        let report = report.clone();

        self.run(move |conn| {
            let metadata = serde_json::to_string(&report.metadata)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let tx = conn.transaction()?;

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM reports WHERE report_id = ?1",
                    params![report.report_id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::Duplicate(report.report_id.to_hex()));
            }

            tx.execute(
                &format!(
                    "INSERT INTO reports ({REPORT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
                ),
                params![
                    report.report_id.as_bytes().as_slice(),
                    report.title,
                    report.description,
                    report.report_type.as_str(),
                    report.sender_id.as_str(),
                    report.recipient_id.as_str(),
                    report.encrypted_content,
                    report.content_hash.to_hex(),
                    report.anchor.fingerprint.to_hex(),
                    report.anchor.tx_ref,
                    report.anchor.anchored_at,
                    metadata,
                    report.access_control.is_public,
                    report.status.as_str(),
                    report.created_at,
                    report.updated_at,
                ],
            )?;

            for grant in &report.access_control.authorized_users {
                tx.execute(
                    "INSERT INTO report_grants (report_id, user_id, access_level, granted_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        report.report_id.as_bytes().as_slice(),
                        grant.user_id.as_str(),
                        grant.access_level.as_str(),
                        grant.granted_at,
                        grant.expires_at,
                    ],
                )?;
            }
            for view in &report.views {
                tx.execute(
                    "INSERT INTO report_views (report_id, user_id, viewed_at) VALUES (?1, ?2, ?3)",
                    params![
                        report.report_id.as_bytes().as_slice(),
                        view.user_id.as_str(),
                        view.viewed_at,
                    ],
                )?;
            }

            tx.commit()?;
            tracing::debug!(report_id = %report.report_id, "inserted report");
            Ok(())
        })
        .await
    }

    async fn get_report(&self, id: &ReportId) -> Result<Option<Report>> {
        let id = *id;
        self.run(move |conn| load_report(conn, &id)).await
    }

    async fn reports_sent_by(&self, user: &UserId) -> Result<Vec<Report>> {
        let user = user.clone();
        self.run(move |conn| load_reports_where(conn, "sender_id", &user))
            .await
    }

    async fn reports_received_by(&self, user: &UserId) -> Result<Vec<Report>> {
        let user = user.clone();
        self.run(move |conn| load_reports_where(conn, "recipient_id", &user))
            .await
    }

    async fn report_count(&self) -> Result<usize> {
        self.run(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    async fn put_grant(
        &self,
        id: &ReportId,
        grant: &AuthorizedUser,
        now: i64,
        check: ReportCheck,
    ) -> Result<Report> {
        let id = *id;
        let grant = grant.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            check(&require_report(&tx, &id)?)?;
            touch(&tx, &id, now)?;
            tx.execute(
                "INSERT INTO report_grants (report_id, user_id, access_level, granted_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(report_id, user_id) DO UPDATE SET
                    access_level = excluded.access_level,
                    granted_at = excluded.granted_at,
                    expires_at = excluded.expires_at",
                params![
                    id.as_bytes().as_slice(),
                    grant.user_id.as_str(),
                    grant.access_level.as_str(),
                    grant.granted_at,
                    grant.expires_at,
                ],
            )?;
            let report = require_report(&tx, &id)?;
            tx.commit()?;
            Ok(report)
        })
        .await
    }

    async fn remove_grant(
        &self,
        id: &ReportId,
        user: &UserId,
        now: i64,
        check: ReportCheck,
    ) -> Result<bool> {
        let id = *id;
        let user = user.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            check(&require_report(&tx, &id)?)?;
            let removed = tx.execute(
                "DELETE FROM report_grants WHERE report_id = ?1 AND user_id = ?2",
                params![id.as_bytes().as_slice(), user.as_str()],
            )?;
            if removed > 0 {
                touch(&tx, &id, now)?;
            }
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn set_public(&self, id: &ReportId, is_public: bool, now: i64) -> Result<Report> {
        let id = *id;

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE reports SET is_public = ?2, updated_at = ?3 WHERE report_id = ?1",
                params![id.as_bytes().as_slice(), is_public, now],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(id.to_hex()));
            }
            let report = require_report(&tx, &id)?;
            tx.commit()?;
            Ok(report)
        })
        .await
    }

    async fn update_status(&self, id: &ReportId, next: ReportStatus, now: i64) -> Result<Report> {
        let id = *id;

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let current: Option<String> = tx
                .query_row(
                    "SELECT status FROM reports WHERE report_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            let current: ReportStatus = current
                .ok_or_else(|| StoreError::NotFound(id.to_hex()))?
                .parse()
                .map_err(invalid)?;

            if !current.can_transition_to(next) {
                return Err(StoreError::InvalidTransition {
                    from: current,
                    to: next,
                });
            }

            tx.execute(
                "UPDATE reports SET status = ?2, updated_at = ?3 WHERE report_id = ?1",
                params![id.as_bytes().as_slice(), next.as_str(), now],
            )?;
            let report = require_report(&tx, &id)?;
            tx.commit()?;
            Ok(report)
        })
        .await
    }

    async fn update_metadata(
        &self,
        id: &ReportId,
        patch: &MetadataPatch,
        now: i64,
        check: ReportCheck,
    ) -> Result<Report> {
        let id = *id;
        let patch = patch.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut report = require_report(&tx, &id)?;
            check(&report)?;
            patch.apply(&mut report.metadata);
            let metadata = serde_json::to_string(&report.metadata)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            tx.execute(
                "UPDATE reports SET metadata = ?2, updated_at = ?3 WHERE report_id = ?1",
                params![id.as_bytes().as_slice(), metadata, now],
            )?;
            report.updated_at = now;
            tx.commit()?;
            Ok(report)
        })
        .await
    }

    async fn append_view(&self, id: &ReportId, view: &ViewRecord) -> Result<()> {
        let id = *id;
        let view = view.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM reports WHERE report_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound(id.to_hex()));
            }
            tx.execute(
                "INSERT INTO report_views (report_id, user_id, viewed_at) VALUES (?1, ?2, ?3)",
                params![id.as_bytes().as_slice(), view.user_id.as_str(), view.viewed_at],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl KeyRepository for SqliteStore {
    async fn insert_keypair_if_absent(&self, pair: &UserKeyPair) -> Result<UserKeyPair> {
        let pair = pair.clone();

        self.run(move |conn| {
            let record = encode_key_record(&pair)?;
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT INTO user_keys (user_id, public_key, key_record, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(user_id) DO NOTHING",
                params![
                    pair.user_id().as_str(),
                    pair.public_key().as_bytes().as_slice(),
                    record,
                    pair.created_at(),
                ],
            )?;
            let stored = load_keypair(&tx, pair.user_id().as_str())?.ok_or_else(|| {
                StoreError::InvalidData(format!("keypair for {} vanished", pair.user_id()))
            })?;
            tx.commit()?;
            if inserted > 0 {
                tracing::debug!(user_id = %pair.user_id(), "stored new keypair");
            }
            Ok(stored)
        })
        .await
    }

    async fn get_keypair(&self, user: &UserId) -> Result<Option<UserKeyPair>> {
        let user = user.clone();
        self.run(move |conn| load_keypair(conn, user.as_str())).await
    }

    async fn replace_keypair(&self, pair: &UserKeyPair, now: i64) -> Result<()> {
        let pair = pair.clone();

        self.run(move |conn| {
            let record = encode_key_record(&pair)?;
            let updated = conn.execute(
                "UPDATE user_keys SET public_key = ?2, key_record = ?3, updated_at = ?4
                 WHERE user_id = ?1",
                params![
                    pair.user_id().as_str(),
                    pair.public_key().as_bytes().as_slice(),
                    record,
                    now,
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("keypair for {}", pair.user_id())));
            }
            Ok(())
        })
        .await
    }
}
