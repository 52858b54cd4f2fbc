//! # Sealpost Store
//!
//! Storage abstraction for Sealpost. Provides trait-based interfaces for
//! report and key persistence with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`ReportStore`] - Async trait for report persistence
//! - [`KeyRepository`] - Async trait for per-user key material
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sealpost_store::{ReportStore, SqliteStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("sealpost.db").unwrap();
//!     let count = store.report_count().await.unwrap();
//!     println!("{count} reports");
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic mutations**: every grant, status, metadata and view write is
//!   one locked step (memory) or one transaction (SQLite), with its
//!   [`ReportCheck`] evaluated inside that step
//! - **Conditional key creation**: an existing keypair is never overwritten
//!   by [`KeyRepository::insert_keypair_if_absent`]

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{KeyRepository, ReportCheck, ReportStore};
