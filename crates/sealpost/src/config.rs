//! Engine configuration.

use std::time::Duration;

use sealpost_anchor::AnchorConfig;

/// Default cap on plaintext size (16 MiB).
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 16 * 1024 * 1024;

/// Default cap on tags per report.
pub const DEFAULT_MAX_TAGS: usize = 32;

/// Configuration for the [`ReportEngine`](crate::ReportEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timeout and retry bounds for ledger calls.
    pub anchor: AnchorConfig,
    /// Largest accepted plaintext, in bytes.
    pub max_content_bytes: usize,
    /// Most tags a report may carry after normalization.
    pub max_tags: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            anchor: AnchorConfig::default(),
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
            max_tags: DEFAULT_MAX_TAGS,
        }
    }
}

impl EngineConfig {
    pub fn with_anchor(mut self, anchor: AnchorConfig) -> Self {
        self.anchor = anchor;
        self
    }

    /// Shorthand for adjusting only the ledger timeout.
    pub fn with_anchor_timeout(mut self, timeout: Duration) -> Self {
        self.anchor = self.anchor.with_timeout(timeout);
        self
    }

    pub fn with_max_content_bytes(mut self, max: usize) -> Self {
        self.max_content_bytes = max;
        self
    }

    pub fn with_max_tags(mut self, max: usize) -> Self {
        self.max_tags = max;
        self
    }
}
