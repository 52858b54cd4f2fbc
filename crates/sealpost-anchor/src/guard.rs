//! Timeout and retry around an [`AnchorClient`].
//!
//! Every call is bounded by a per-attempt timeout. Transient failures
//! (`Unavailable`, `Timeout`) are retried with exponential backoff up to a
//! fixed number of attempts; `Rejected` and `NotAnchored` are returned at once.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sealpost_core::{AnchorReceipt, Fingerprint, ReportId};
use tracing::{debug, warn};

use crate::client::AnchorClient;
use crate::error::{AnchorError, Result};

/// Bounds applied to ledger calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorConfig {
    /// Upper bound on a single attempt.
    pub timeout: Duration,
    /// Attempts per call, the first one included. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Cap on the delay between retries.
    pub max_backoff: Duration,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl AnchorConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }
}

/// An [`AnchorClient`] wrapper enforcing [`AnchorConfig`].
pub struct GuardedAnchor<A> {
    inner: A,
    config: AnchorConfig,
}

impl<A: AnchorClient> GuardedAnchor<A> {
    pub fn new(inner: A, config: AnchorConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    async fn guarded<T, F, Fut>(&self, op: &'static str, report_id: &ReportId, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 1;

        loop {
            let result = match tokio::time::timeout(self.config.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(AnchorError::Timeout(self.config.timeout)),
            };

            match result {
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        op,
                        %report_id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "ledger call failed, retrying in {backoff:?}"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff, self.config.max_backoff);
                    attempt += 1;
                }
                Err(e) => {
                    debug!(op, %report_id, attempt, error = %e, "ledger call failed");
                    return Err(e);
                }
                Ok(value) => return Ok(value),
            }
        }
    }
}

#[async_trait]
impl<A: AnchorClient> AnchorClient for GuardedAnchor<A> {
    async fn anchor(&self, report_id: &ReportId, fingerprint: &Fingerprint) -> Result<AnchorReceipt> {
        self.guarded("anchor", report_id, || self.inner.anchor(report_id, fingerprint))
            .await
    }

    async fn verify(&self, report_id: &ReportId, fingerprint: &Fingerprint) -> Result<bool> {
        self.guarded("verify", report_id, || self.inner.verify(report_id, fingerprint))
            .await
    }
}

/// Double the delay, capped at `max`. Never overflows.
fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
