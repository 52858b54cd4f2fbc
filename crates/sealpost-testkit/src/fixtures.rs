//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;
use std::time::Duration;

use sealpost::{EngineConfig, MemoryDirectory, ReportEngine, Role, UserRecord};
use sealpost_anchor::{AnchorConfig, MemoryLedger};
use sealpost_core::{Clock, ManualClock, NewReport, Report, ReportType, UserId};
use sealpost_perms::{Entropy, EntropyError, OsEntropy};
use sealpost_store::{KeyRepository, MemoryStore, ReportStore};

/// Start time of every fixture clock (Unix ms).
pub const START_MILLIS: i64 = 1_700_000_000_000;

/// Users registered in every [`TestWorld`].
pub const USERS: [(&str, Role); 4] = [
    ("alice", Role::Doctor),
    ("bob", Role::Patient),
    ("carol", Role::HealthcareProvider),
    ("dave", Role::InsuranceProvider),
];

/// Build a user id, panicking on invalid input.
pub fn user(name: &str) -> UserId {
    UserId::new(name).expect("valid user id")
}

/// Engine config with short ledger timeouts and backoff.
pub fn fast_config() -> EngineConfig {
    EngineConfig::default().with_anchor(
        AnchorConfig::default()
            .with_timeout(Duration::from_millis(200))
            .with_max_attempts(2)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(4)),
    )
}

/// An entropy source that always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingEntropy;

impl Entropy for FailingEntropy {
    fn fill(&self, _buf: &mut [u8]) -> Result<(), EntropyError> {
        Err(EntropyError::new(std::io::Error::other(
            "entropy source unavailable",
        )))
    }
}

/// An engine wired to in-memory collaborators the test can reach into.
pub struct TestWorld<S = MemoryStore> {
    pub engine: ReportEngine<S>,
    pub store: Arc<S>,
    pub ledger: Arc<MemoryLedger>,
    pub directory: Arc<MemoryDirectory>,
    pub clock: ManualClock,
}

impl TestWorld<MemoryStore> {
    /// Memory store, fast config, OS entropy.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl Default for TestWorld<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ReportStore + KeyRepository> TestWorld<S> {
    /// Fast config and OS entropy over the given store.
    pub fn with_store(store: S) -> Self {
        Self::build(store, fast_config(), Arc::new(OsEntropy))
    }

    /// Full control over store, config and entropy.
    pub fn build(store: S, config: EngineConfig, entropy: Arc<dyn Entropy>) -> Self {
        let store = Arc::new(store);
        let clock = ManualClock::new(START_MILLIS);
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let ledger = Arc::new(MemoryLedger::with_clock(shared_clock.clone()));
        let directory = Arc::new(MemoryDirectory::with_users(
            USERS
                .iter()
                .map(|(name, role)| UserRecord::new(user(name), *role)),
        ));

        let engine = ReportEngine::builder(store.clone(), ledger.clone(), directory.clone())
            .config(config)
            .clock(shared_clock)
            .entropy(entropy)
            .build();

        Self {
            engine,
            store,
            ledger,
            directory,
            clock,
        }
    }

    /// Shorthand for [`user`].
    pub fn user(&self, name: &str) -> UserId {
        user(name)
    }

    /// Send a medical report with the given content.
    pub async fn send(&self, from: &str, to: &str, content: &[u8]) -> anyhow::Result<Report> {
        let input = NewReport::new("Consultation notes", ReportType::MedicalReport, content.to_vec())
            .tags(["follow-up"]);
        Ok(self.engine.create_report(input, &user(from), &user(to)).await?)
    }
}
