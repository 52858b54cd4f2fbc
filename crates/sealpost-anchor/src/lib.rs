//! # Sealpost Anchor
//!
//! Registers report fingerprints with an external immutable ledger and
//! checks them later.
//!
//! ## Key Types
//!
//! - [`AnchorClient`] - The async ledger interface (`anchor`, `verify`)
//! - [`MemoryLedger`] - In-process ledger with outage and tamper controls
//! - [`GuardedAnchor`] - Timeout and bounded retry around any client
//!
//! ## Failure Model
//!
//! `Unavailable` and `Timeout` are transient and may be retried. `Rejected`
//! is a permanent refusal. `NotAnchored` means the ledger has no entry for
//! the report, which callers treat as an integrity failure.

pub mod client;
pub mod error;
pub mod guard;
pub mod memory;

pub use client::AnchorClient;
pub use error::{AnchorError, Result};
pub use guard::{AnchorConfig, GuardedAnchor};
pub use memory::MemoryLedger;
