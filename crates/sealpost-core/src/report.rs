//! The Report: the central entity exchanged between two parties.
//!
//! A report carries an opaque encrypted token, the fingerprint of that token,
//! plaintext metadata for indexing, an access-control list and an append-only
//! view log. Reports are never deleted; archival is a status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::fingerprint::Fingerprint;
use crate::status::ReportStatus;
use crate::types::{ReportId, UserId};

/// Default content type for report payloads.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// All variants.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Stable string form.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(CoreError::UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

/// Classification of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    MedicalReport,
    TestResult,
    Prescription,
    InsuranceClaim,
    Diagnosis,
    TreatmentPlan,
    MedicalHistory,
}

string_enum!(ReportType, "report type", {
    MedicalReport => "medical_report",
    TestResult => "test_result",
    Prescription => "prescription",
    InsuranceClaim => "insurance_claim",
    Diagnosis => "diagnosis",
    TreatmentPlan => "treatment_plan",
    MedicalHistory => "medical_history",
});

/// Handling priority of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

string_enum!(Priority, "priority", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

/// Level of access conferred by an explicit grant.
///
/// `Admin` implies `Write`, which implies `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

string_enum!(AccessLevel, "access level", {
    Read => "read",
    Write => "write",
    Admin => "admin",
});

/// Plaintext metadata, used for indexing without decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    /// Report date (Unix ms). Defaults to creation time.
    pub date: i64,
    pub tags: Vec<String>,
    pub priority: Priority,
    /// Plaintext size in bytes.
    pub size: u64,
    pub content_type: String,
}

/// A single explicit grant on a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedUser {
    pub user_id: UserId,
    pub access_level: AccessLevel,
    /// When the grant was made (Unix ms).
    pub granted_at: i64,
    /// When the grant stops authorizing (Unix ms), if ever.
    pub expires_at: Option<i64>,
}

impl AuthorizedUser {
    /// A grant is live while `now` is strictly before its expiry.
    pub fn is_live(&self, now: i64) -> bool {
        match self.expires_at {
            Some(expires) => now < expires,
            None => true,
        }
    }
}

/// Access-control block of a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControl {
    pub is_public: bool,
    pub authorized_users: Vec<AuthorizedUser>,
}

impl AccessControl {
    /// Find the grant entry for a user, live or not.
    pub fn entry(&self, user: &UserId) -> Option<&AuthorizedUser> {
        self.authorized_users.iter().find(|g| &g.user_id == user)
    }
}

/// One entry in the append-only view log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRecord {
    pub user_id: UserId,
    pub viewed_at: i64,
}

/// Reference returned by the ledger when a fingerprint is anchored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorReceipt {
    pub report_id: ReportId,
    pub fingerprint: Fingerprint,
    /// Ledger-side reference (e.g. a transaction hash).
    pub tx_ref: String,
    pub anchored_at: i64,
}

/// A persisted report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub report_id: ReportId,
    pub title: String,
    pub description: String,
    pub report_type: ReportType,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    /// Compact encrypted token; see `sealpost_perms::envelope`.
    pub encrypted_content: String,
    /// Fingerprint of `encrypted_content`.
    pub content_hash: Fingerprint,
    pub anchor: AnchorReceipt,
    pub metadata: ReportMetadata,
    pub access_control: AccessControl,
    pub status: ReportStatus,
    pub views: Vec<ViewRecord>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Report {
    /// Whether `user` is the sender or the recipient.
    pub fn is_owner(&self, user: &UserId) -> bool {
        &self.sender_id == user || &self.recipient_id == user
    }

    /// Whether `user` is the recipient.
    pub fn is_recipient(&self, user: &UserId) -> bool {
        &self.recipient_id == user
    }

    /// Replace the encrypted content, re-deriving the fingerprint.
    pub fn set_encrypted_content(&mut self, token: String, now: i64) {
        self.content_hash = Fingerprint::of(token.as_bytes());
        self.encrypted_content = token;
        self.updated_at = now;
    }

    /// Check that `content_hash` still matches `encrypted_content`.
    pub fn content_hash_matches(&self) -> bool {
        self.content_hash.matches(self.encrypted_content.as_bytes())
    }
}

/// Input for creating a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub report_type: ReportType,
    /// Plaintext content, encrypted for the recipient before persistence.
    #[serde(default)]
    pub content: Vec<u8>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Report date (Unix ms); defaults to creation time.
    #[serde(default)]
    pub date: Option<i64>,
    /// Create in `Draft` instead of `Submitted`.
    #[serde(default)]
    pub draft: bool,
}

impl NewReport {
    /// Start a new report with the required fields.
    pub fn new(title: impl Into<String>, report_type: ReportType, content: impl Into<Vec<u8>>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            report_type,
            content: content.into(),
            tags: Vec::new(),
            priority: Priority::default(),
            content_type: None,
            date: None,
            draft: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn date(mut self, date: i64) -> Self {
        self.date = Some(date);
        self
    }

    pub fn as_draft(mut self) -> Self {
        self.draft = true;
        self
    }

    /// Initial lifecycle status for this input.
    pub fn initial_status(&self) -> ReportStatus {
        if self.draft {
            ReportStatus::Draft
        } else {
            ReportStatus::Submitted
        }
    }

    /// Validate and normalize: trims the title and tags, drops empty tags.
    pub fn normalized(mut self, max_content_bytes: usize, max_tags: usize) -> Result<Self, CoreError> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(CoreError::InvalidInput("title is required".into()));
        }
        if self.content.len() > max_content_bytes {
            return Err(CoreError::InvalidInput(format!(
                "content is {} bytes, limit is {max_content_bytes}",
                self.content.len()
            )));
        }
        self.tags = normalize_tags(self.tags);
        if self.tags.len() > max_tags {
            return Err(CoreError::InvalidInput(format!(
                "{} tags given, limit is {max_tags}",
                self.tags.len()
            )));
        }
        Ok(self)
    }
}

/// Partial update of plaintext metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    pub tags: Option<Vec<String>>,
    pub priority: Option<Priority>,
    pub date: Option<i64>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.tags.is_none() && self.priority.is_none() && self.date.is_none()
    }

    /// Apply onto existing metadata. Never touches size or content type.
    pub fn apply(&self, metadata: &mut ReportMetadata) {
        if let Some(tags) = &self.tags {
            metadata.tags = normalize_tags(tags.clone());
        }
        if let Some(priority) = self.priority {
            metadata.priority = priority;
        }
        if let Some(date) = self.date {
            metadata.date = date;
        }
    }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Filters for listing reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilter {
    pub report_type: Option<ReportType>,
    pub status: Option<ReportStatus>,
    /// Inclusive lower bound on the report date (Unix ms).
    pub start_date: Option<i64>,
    /// Inclusive upper bound on the report date (Unix ms).
    pub end_date: Option<i64>,
    pub tag: Option<String>,
    pub priority: Option<Priority>,
}

impl ReportFilter {
    pub fn report_type(mut self, report_type: ReportType) -> Self {
        self.report_type = Some(report_type);
        self
    }

    pub fn status(mut self, status: ReportStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn between(mut self, start: i64, end: i64) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Check whether a report passes every set filter.
    pub fn matches(&self, report: &Report) -> bool {
        if self.report_type.is_some_and(|t| t != report.report_type) {
            return false;
        }
        if self.status.is_some_and(|s| s != report.status) {
            return false;
        }
        if self.start_date.is_some_and(|start| report.metadata.date < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| report.metadata.date > end) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !report.metadata.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        if self.priority.is_some_and(|p| p != report.metadata.priority) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn sample_report() -> Report {
        let token = "header.epk.nonce.ct".to_string();
        let report_id = ReportId::from_bytes([7; 16]);
        let content_hash = Fingerprint::of(token.as_bytes());
        Report {
            report_id,
            title: "Blood panel".into(),
            description: String::new(),
            report_type: ReportType::TestResult,
            sender_id: user("alice"),
            recipient_id: user("bob"),
            encrypted_content: token,
            content_hash,
            anchor: AnchorReceipt {
                report_id,
                fingerprint: content_hash,
                tx_ref: "tx-1".into(),
                anchored_at: 10,
            },
            metadata: ReportMetadata {
                date: 1_000,
                tags: vec!["lab".into()],
                priority: Priority::High,
                size: 12,
                content_type: DEFAULT_CONTENT_TYPE.into(),
            },
            access_control: AccessControl::default(),
            status: ReportStatus::Submitted,
            views: Vec::new(),
            created_at: 10,
            updated_at: 10,
        }
    }

    #[test]
    fn test_owner_checks() {
        let report = sample_report();
        assert!(report.is_owner(&user("alice")));
        assert!(report.is_owner(&user("bob")));
        assert!(!report.is_owner(&user("carol")));
        assert!(report.is_recipient(&user("bob")));
        assert!(!report.is_recipient(&user("alice")));
    }

    #[test]
    fn test_set_encrypted_content_rederives_hash() {
        let mut report = sample_report();
        assert!(report.content_hash_matches());

        report.encrypted_content.push('x');
        assert!(!report.content_hash_matches());

        report.set_encrypted_content("other.token".into(), 20);
        assert!(report.content_hash_matches());
        assert_eq!(report.updated_at, 20);
        assert_eq!(report.created_at, 10);
    }

    #[test]
    fn test_grant_liveness_is_exclusive_of_expiry() {
        let grant = AuthorizedUser {
            user_id: user("carol"),
            access_level: AccessLevel::Read,
            granted_at: 0,
            expires_at: Some(100),
        };
        assert!(grant.is_live(99));
        assert!(!grant.is_live(100));
    }

    #[test]
    fn test_new_report_normalization() {
        let input = NewReport::new("  Scan  ", ReportType::Diagnosis, b"x".to_vec())
            .tags(["mri", " mri ", "", "knee"]);
        let normalized = input.normalized(1024, 8).unwrap();
        assert_eq!(normalized.title, "Scan");
        assert_eq!(normalized.tags, vec!["mri", "knee"]);

        let blank = NewReport::new("   ", ReportType::Diagnosis, Vec::new());
        assert!(blank.normalized(1024, 8).is_err());

        let big = NewReport::new("Big", ReportType::Diagnosis, vec![0u8; 10]);
        assert!(big.normalized(9, 8).is_err());
    }

    #[test]
    fn test_filter_matching() {
        let report = sample_report();
        assert!(ReportFilter::default().matches(&report));
        assert!(ReportFilter::default().report_type(ReportType::TestResult).matches(&report));
        assert!(!ReportFilter::default().report_type(ReportType::Diagnosis).matches(&report));
        assert!(ReportFilter::default().between(1_000, 1_000).matches(&report));
        assert!(!ReportFilter::default().between(1_001, 2_000).matches(&report));
        assert!(ReportFilter::default().tag("lab").matches(&report));
        assert!(!ReportFilter::default().tag("xray").matches(&report));
        assert!(!ReportFilter::default().priority(Priority::Low).matches(&report));
        assert!(!ReportFilter::default().status(ReportStatus::Draft).matches(&report));
    }

    #[test]
    fn test_metadata_patch_leaves_size() {
        let mut report = sample_report();
        let patch = MetadataPatch {
            tags: Some(vec!["a".into(), "a".into()]),
            priority: Some(Priority::Urgent),
            date: None,
        };
        patch.apply(&mut report.metadata);
        assert_eq!(report.metadata.tags, vec!["a"]);
        assert_eq!(report.metadata.priority, Priority::Urgent);
        assert_eq!(report.metadata.size, 12);
        assert_eq!(report.metadata.date, 1_000);
    }

    #[test]
    fn test_enum_string_forms() {
        assert_eq!("insurance_claim".parse::<ReportType>().unwrap(), ReportType::InsuranceClaim);
        assert_eq!(AccessLevel::Admin.to_string(), "admin");
        assert!("owner".parse::<AccessLevel>().is_err());
        assert_eq!(ReportType::ALL.len(), 7);
    }

    #[test]
    fn test_report_json_uses_camel_case() {
        let json = serde_json::to_value(sample_report()).unwrap();
        assert!(json.get("contentHash").is_some());
        assert_eq!(json["reportType"], "test_result");
        assert_eq!(json["accessControl"]["isPublic"], false);
    }
}
