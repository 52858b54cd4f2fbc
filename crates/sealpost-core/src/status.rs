//! Report lifecycle state machine.
//!
//! The linear path is `Draft -> Submitted -> {Approved, Rejected} -> Archived`.
//! `Draft` and `Archived` can also be reached directly from any other state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Status of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Archived,
}

impl ReportStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [ReportStatus; 5] = [
        ReportStatus::Draft,
        ReportStatus::Submitted,
        ReportStatus::Approved,
        ReportStatus::Rejected,
        ReportStatus::Archived,
    ];

    /// Stable string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Draft => "draft",
            ReportStatus::Submitted => "submitted",
            ReportStatus::Approved => "approved",
            ReportStatus::Rejected => "rejected",
            ReportStatus::Archived => "archived",
        }
    }

    /// Check whether `self -> next` is an allowed edge.
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        use ReportStatus::*;

        if *self == next {
            return false;
        }

        match (self, next) {
            (_, Draft) | (_, Archived) => true,
            (Draft, Submitted) => true,
            (Submitted, Approved) | (Submitted, Rejected) => true,
            _ => false,
        }
    }

    /// Validate a transition, returning the new status.
    pub fn transition(self, next: ReportStatus) -> Result<ReportStatus, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl Default for ReportStatus {
    fn default() -> Self {
        ReportStatus::Submitted
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "report status",
                value: s.to_string(),
            })
    }
}
