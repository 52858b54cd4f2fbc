//! In-process ledger.
//!
//! Behaves like an append-only ledger: an anchored fingerprint can never be
//! changed through the client interface. Tests get extra knobs to simulate
//! outages, latency and tampering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sealpost_core::{AnchorReceipt, Clock, Fingerprint, ReportId, SystemClock};

use crate::client::AnchorClient;
use crate::error::{AnchorError, Result};

/// In-memory ledger for tests and embedding.
pub struct MemoryLedger {
    entries: Mutex<HashMap<ReportId, Entry>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
    /// Transient failures to inject before calls succeed again.
    pending_failures: AtomicUsize,
    latency: Mutex<Option<Duration>>,
    anchor_calls: AtomicUsize,
    verify_calls: AtomicUsize,
}

#[derive(Debug, Clone)]
struct Entry {
    fingerprint: Fingerprint,
    tx_ref: String,
    anchored_at: i64,
}

impl MemoryLedger {
    /// Create an empty ledger using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty ledger with an explicit clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
            pending_failures: AtomicUsize::new(0),
            latency: Mutex::new(None),
            anchor_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        }
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Fail the next `n` calls with `Unavailable`.
    pub fn fail_next(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    /// Overwrite the anchored fingerprint behind the client's back.
    ///
    /// Returns `false` if nothing was anchored for the report.
    pub fn tamper(&self, report_id: &ReportId, fingerprint: Fingerprint) -> bool {
        match lock(&self.entries).get_mut(report_id) {
            Some(entry) => {
                entry.fingerprint = fingerprint;
                true
            }
            None => false,
        }
    }

    /// The fingerprint currently anchored for a report.
    pub fn anchored(&self, report_id: &ReportId) -> Option<Fingerprint> {
        lock(&self.entries).get(report_id).map(|e| e.fingerprint)
    }

    /// Number of anchored reports.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls made to [`AnchorClient::anchor`], failed ones included.
    pub fn anchor_calls(&self) -> usize {
        self.anchor_calls.load(Ordering::SeqCst)
    }

    /// Calls made to [`AnchorClient::verify`], failed ones included.
    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    async fn simulate_network(&self) -> Result<()> {
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(AnchorError::Unavailable("ledger offline".into()));
        }
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AnchorError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn tx_ref(report_id: &ReportId, fingerprint: &Fingerprint, anchored_at: i64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(report_id.as_bytes());
    hasher.update(fingerprint.as_bytes());
    hasher.update(&anchored_at.to_be_bytes());
    format!("0x{}", hasher.finalize().to_hex())
}

#[async_trait]
impl AnchorClient for MemoryLedger {
    async fn anchor(&self, report_id: &ReportId, fingerprint: &Fingerprint) -> Result<AnchorReceipt> {
        self.anchor_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_network().await?;

        let mut entries = lock(&self.entries);
        if let Some(existing) = entries.get(report_id) {
            // Re-anchoring the same value is idempotent; changing it is not.
            return if existing.fingerprint == *fingerprint {
                Ok(AnchorReceipt {
                    report_id: *report_id,
                    fingerprint: existing.fingerprint,
                    tx_ref: existing.tx_ref.clone(),
                    anchored_at: existing.anchored_at,
                })
            } else {
                Err(AnchorError::Rejected(format!(
                    "report {report_id} is already anchored with a different fingerprint"
                )))
            };
        }

        let anchored_at = self.clock.now_millis();
        let entry = Entry {
            fingerprint: *fingerprint,
            tx_ref: tx_ref(report_id, fingerprint, anchored_at),
            anchored_at,
        };
        let receipt = AnchorReceipt {
            report_id: *report_id,
            fingerprint: entry.fingerprint,
            tx_ref: entry.tx_ref.clone(),
            anchored_at,
        };
        entries.insert(*report_id, entry);
        Ok(receipt)
    }

    async fn verify(&self, report_id: &ReportId, fingerprint: &Fingerprint) -> Result<bool> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_network().await?;

        lock(&self.entries)
            .get(report_id)
            .map(|entry| entry.fingerprint == *fingerprint)
            .ok_or(AnchorError::NotAnchored(*report_id))
    }
}
