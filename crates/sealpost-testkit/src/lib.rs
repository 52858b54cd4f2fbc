//! # Sealpost Testkit
//!
//! Testing utilities for Sealpost.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a ready-made [`TestWorld`] with an engine, an in-memory
//!   ledger, a manual clock and four registered users
//! - **Generators**: Proptest strategies for report inputs and enums
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use sealpost_testkit::TestWorld;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let world = TestWorld::new();
//!     let report = world.send("alice", "bob", b"hb 14.2").await?;
//!     let view = world.engine.get_report(&report.report_id, &world.user("bob")).await?;
//!     assert_eq!(view.plaintext.as_deref(), Some(&b"hb 14.2"[..]));
//!     Ok(())
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use sealpost_testkit::generators::new_report;
//!
//! proptest! {
//!     #[test]
//!     fn normalized_tags_are_trimmed(input in new_report()) {
//!         let normalized = input.normalized(usize::MAX, usize::MAX).unwrap();
//!         prop_assert!(normalized.tags.iter().all(|t| !t.is_empty() && t.trim() == t));
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{fast_config, user, FailingEntropy, TestWorld, START_MILLIS, USERS};
pub use generators::{new_report, ReportParams};
