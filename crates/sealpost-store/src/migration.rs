//! Versioned SQLite schema for reports, grants, views and key records.
//!
//! `schema_migrations` records every applied version. Opening a database
//! written by a newer release fails instead of guessing at its layout.

use rusqlite::Connection;
use sealpost_core::{Clock, SystemClock};

use crate::error::{Result, StoreError};

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = 1;

/// Bring `conn` up to [`CURRENT_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {current} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        let applied_at = SystemClock.now_millis();
        for version in (current + 1)..=CURRENT_VERSION {
            apply_version(&tx, version)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, applied_at],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_version(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => schema_v1(conn),
        other => Err(StoreError::Migration(format!("no schema step for version {other}"))),
    }
}

/// Reports with their grants and view log, plus per-user key records.
fn schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Reports: one row per report, never deleted
        CREATE TABLE reports (
            report_id BLOB PRIMARY KEY,          -- 16 bytes
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            report_type TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            recipient_id TEXT NOT NULL,
            encrypted_content TEXT NOT NULL,     -- compact envelope token
            content_hash TEXT NOT NULL,          -- 64 hex chars
            anchor_fingerprint TEXT NOT NULL,    -- fingerprint registered with the ledger
            anchor_tx_ref TEXT NOT NULL,
            anchored_at INTEGER NOT NULL,
            metadata TEXT NOT NULL,              -- JSON ReportMetadata
            is_public INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Explicit grants: at most one per (report, user)
        CREATE TABLE report_grants (
            report_id BLOB NOT NULL REFERENCES reports(report_id),
            user_id TEXT NOT NULL,
            access_level TEXT NOT NULL,
            granted_at INTEGER NOT NULL,
            expires_at INTEGER,                  -- NULL = never expires
            PRIMARY KEY (report_id, user_id)
        );

        -- Append-only view log
        CREATE TABLE report_views (
            view_id INTEGER PRIMARY KEY AUTOINCREMENT,
            report_id BLOB NOT NULL REFERENCES reports(report_id),
            user_id TEXT NOT NULL,
            viewed_at INTEGER NOT NULL
        );

        -- Per-user key material
        CREATE TABLE user_keys (
            user_id TEXT PRIMARY KEY,
            public_key BLOB NOT NULL,            -- 32 bytes, X25519
            key_record BLOB NOT NULL,            -- CBOR KeyRecord
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE INDEX idx_reports_sender ON reports(sender_id);
        CREATE INDEX idx_reports_recipient ON reports(recipient_id);
        CREATE INDEX idx_report_views_report ON report_views(report_id);
        "#,
    )?;

    Ok(())
}
