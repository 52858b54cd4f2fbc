//! # Sealpost
//!
//! Secure report exchange between healthcare parties, with content sealed
//! for the recipient and fingerprints anchored on an immutable ledger.
//!
//! ## Overview
//!
//! The engine provides:
//!
//! - **Envelope encryption**: report content is encrypted to the recipient's
//!   X25519 key; nobody else can read it, the sender included
//! - **Integrity**: every ciphertext is fingerprinted and anchored before it
//!   is stored, and re-checked against the ledger on every read
//! - **Access control**: implicit owners, explicit expiring grants, public flag
//! - **Lifecycle**: a small status state machine per report
//! - **Audit**: every successful read is recorded
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sealpost::{MemoryDirectory, ReportEngine, Role, UserRecord};
//! use sealpost::anchor::MemoryLedger;
//! use sealpost::core::{NewReport, ReportType, UserId};
//! use sealpost::store::SqliteStore;
//!
//! async fn example() -> sealpost::Result<()> {
//!     let alice = UserId::new("alice")?;
//!     let bob = UserId::new("bob")?;
//!     let directory = MemoryDirectory::with_users([
//!         UserRecord::new(alice.clone(), Role::Doctor),
//!         UserRecord::new(bob.clone(), Role::Patient),
//!     ]);
//!
//!     let engine = ReportEngine::builder(
//!         Arc::new(SqliteStore::open("sealpost.db")?),
//!         Arc::new(MemoryLedger::new()),
//!         Arc::new(directory),
//!     )
//!     .build();
//!
//!     let report = engine
//!         .create_report(
//!             NewReport::new("Blood panel", ReportType::TestResult, b"hb 14.2".to_vec()),
//!             &alice,
//!             &bob,
//!         )
//!         .await?;
//!
//!     let view = engine.get_report(&report.report_id, &bob).await?;
//!     assert_eq!(view.plaintext.as_deref(), Some(&b"hb 14.2"[..]));
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `sealpost::core` - Report model, identifiers, fingerprints, status
//! - `sealpost::perms` - Keys, envelope encryption, access rules
//! - `sealpost::store` - Storage traits, memory and SQLite stores
//! - `sealpost::anchor` - Ledger client, in-memory ledger, retry guard

pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod keystore;

// Re-export component crates
pub use sealpost_anchor as anchor;
pub use sealpost_core as core;
pub use sealpost_perms as perms;
pub use sealpost_store as store;

// Re-export main types for convenience
pub use config::{EngineConfig, DEFAULT_MAX_CONTENT_BYTES, DEFAULT_MAX_TAGS};
pub use directory::{MemoryDirectory, Role, UserDirectory, UserRecord};
pub use engine::{EngineBuilder, IntegrityReport, ReportEngine, ReportListing, ReportView};
pub use error::{EngineError, Result};
pub use keystore::KeyStore;

// Re-export commonly used types
pub use sealpost_core::{
    AccessLevel, MetadataPatch, NewReport, Priority, Report, ReportFilter, ReportId, ReportStatus,
    ReportType, UserId,
};
pub use sealpost_perms::{AccessState, PublicKeyInfo};
