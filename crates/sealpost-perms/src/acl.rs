//! Access-control decisions for reports.
//!
//! Access to a report comes from three places:
//!
//! 1. **Implicit ownership**: the sender and the recipient are always
//!    authorized. This is structural and cannot be granted or revoked.
//! 2. **Explicit grants**: at most one [`AuthorizedUser`] entry per user,
//!    optionally bounded by an expiry. Expiry is passive data compared
//!    against `now` at check time.
//! 3. **Public flag**: a public report is readable by anyone.
//!
//! All functions here are pure; persistence of the resulting
//! [`AccessControl`] is the caller's concern.

use serde::{Deserialize, Serialize};

use sealpost_core::{AccessControl, AccessLevel, AuthorizedUser, Report, UserId};

use crate::error::{PermsError, Result};

/// Access state of one user with respect to one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AccessState {
    /// No grant, not an owner, report not public.
    NoAccess,
    /// Sender or recipient.
    ImplicitOwner,
    /// A live explicit grant.
    Granted {
        level: AccessLevel,
        expires_at: Option<i64>,
    },
    /// The report is public and the user holds no live grant.
    Public,
    /// The user's grant has lapsed and the report is not public.
    Expired { level: AccessLevel, expired_at: i64 },
}

impl AccessState {
    /// Whether this state authorizes reading the report.
    pub fn is_authorized(&self) -> bool {
        matches!(
            self,
            AccessState::ImplicitOwner | AccessState::Granted { .. } | AccessState::Public
        )
    }

    /// Whether this state allows metadata changes.
    pub fn can_write(&self) -> bool {
        match self {
            AccessState::ImplicitOwner => true,
            AccessState::Granted { level, .. } => *level >= AccessLevel::Write,
            _ => false,
        }
    }

    /// Whether this state allows managing grants.
    pub fn can_manage(&self) -> bool {
        matches!(
            self,
            AccessState::ImplicitOwner
                | AccessState::Granted {
                    level: AccessLevel::Admin,
                    ..
                }
        )
    }
}

/// Compute the access state of `user` on `report` at time `now`.
///
/// A live grant takes precedence over the public flag so that write and
/// admin grants keep their power on public reports.
pub fn access_state(report: &Report, user: &UserId, now: i64) -> AccessState {
    if report.is_owner(user) {
        return AccessState::ImplicitOwner;
    }

    let entry = report.access_control.entry(user);
    if let Some(grant) = entry.filter(|g| g.is_live(now)) {
        return AccessState::Granted {
            level: grant.access_level,
            expires_at: grant.expires_at,
        };
    }

    if report.access_control.is_public {
        return AccessState::Public;
    }

    match entry.and_then(|g| g.expires_at.map(|at| (g.access_level, at))) {
        Some((level, expired_at)) => AccessState::Expired { level, expired_at },
        None => AccessState::NoAccess,
    }
}

/// Owner, public report, or live grant.
pub fn authorize(report: &Report, user: &UserId, now: i64) -> bool {
    access_state(report, user, now).is_authorized()
}

/// Owners and live `Write`/`Admin` grantees.
pub fn can_write(report: &Report, user: &UserId, now: i64) -> bool {
    access_state(report, user, now).can_write()
}

/// Owners and live `Admin` grantees.
pub fn can_manage(report: &Report, user: &UserId, now: i64) -> bool {
    access_state(report, user, now).can_manage()
}

/// Validate a grant request and build the entry to store.
///
/// The granter must be an owner or hold a live `Admin` grant, and only owners
/// may hand out `Admin`. Owners cannot be targets. An expiry must lie in the
/// future.
pub fn check_grant(
    report: &Report,
    granter: &UserId,
    target: &UserId,
    level: AccessLevel,
    expires_at: Option<i64>,
    now: i64,
) -> Result<AuthorizedUser> {
    check_manager(report, granter, now)?;

    if level == AccessLevel::Admin && !report.is_owner(granter) {
        return Err(PermsError::PermissionDenied(format!(
            "{granter} may not grant admin access"
        )));
    }
    if report.is_owner(target) {
        return Err(PermsError::ImplicitOwner(target.clone()));
    }
    if let Some(expires) = expires_at {
        if expires <= now {
            return Err(PermsError::InvalidGrant(format!(
                "expiry {expires} is not after {now}"
            )));
        }
    }

    Ok(AuthorizedUser {
        user_id: target.clone(),
        access_level: level,
        granted_at: now,
        expires_at,
    })
}

/// Validate a revoke request.
///
/// Same granter rule as [`check_grant`]; a non-owner admin cannot revoke
/// another admin.
pub fn check_revoke(report: &Report, granter: &UserId, target: &UserId, now: i64) -> Result<()> {
    check_manager(report, granter, now)?;

    if report.is_owner(target) {
        return Err(PermsError::ImplicitOwner(target.clone()));
    }
    let entry = report
        .access_control
        .entry(target)
        .ok_or_else(|| PermsError::GrantNotFound(target.clone()))?;
    if entry.access_level == AccessLevel::Admin && !report.is_owner(granter) {
        return Err(PermsError::PermissionDenied(format!(
            "{granter} may not revoke admin access"
        )));
    }
    Ok(())
}

fn check_manager(report: &Report, granter: &UserId, now: i64) -> Result<()> {
    if can_manage(report, granter, now) {
        Ok(())
    } else {
        Err(PermsError::PermissionDenied(format!(
            "{granter} cannot manage access to report {}",
            report.report_id
        )))
    }
}

/// Insert or replace the grant for `grant.user_id`.
pub fn apply_grant(acl: &mut AccessControl, grant: AuthorizedUser) {
    match acl
        .authorized_users
        .iter_mut()
        .find(|g| g.user_id == grant.user_id)
    {
        Some(existing) => *existing = grant,
        None => acl.authorized_users.push(grant),
    }
}

/// Remove the grant for `user`. Returns whether one existed.
pub fn apply_revoke(acl: &mut AccessControl, user: &UserId) -> bool {
    let before = acl.authorized_users.len();
    acl.authorized_users.retain(|g| &g.user_id != user);
    acl.authorized_users.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealpost_core::{
        AnchorReceipt, Fingerprint, Priority, ReportId, ReportMetadata, ReportStatus, ReportType,
    };

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn report() -> Report {
        let token = "t.o.k.en".to_string();
        let report_id = ReportId::from_bytes([1; 16]);
        let content_hash = Fingerprint::of(token.as_bytes());
        Report {
            report_id,
            title: "Diagnosis".into(),
            description: String::new(),
            report_type: ReportType::Diagnosis,
            sender_id: user("alice"),
            recipient_id: user("bob"),
            encrypted_content: token,
            content_hash,
            anchor: AnchorReceipt {
                report_id,
                fingerprint: content_hash,
                tx_ref: "tx".into(),
                anchored_at: 0,
            },
            metadata: ReportMetadata {
                date: 0,
                tags: Vec::new(),
                priority: Priority::Medium,
                size: 0,
                content_type: "text/plain".into(),
            },
            access_control: AccessControl::default(),
            status: ReportStatus::Submitted,
            views: Vec::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn grant(report: &mut Report, who: &str, level: AccessLevel, expires_at: Option<i64>) {
        let entry = check_grant(report, &user("alice"), &user(who), level, expires_at, 0).unwrap();
        apply_grant(&mut report.access_control, entry);
    }

    #[test]
    fn test_owners_always_authorized() {
        let report = report();
        assert_eq!(access_state(&report, &user("alice"), 0), AccessState::ImplicitOwner);
        assert!(authorize(&report, &user("bob"), i64::MAX));
        assert!(can_manage(&report, &user("bob"), 0));
        assert!(!authorize(&report, &user("carol"), 0));
    }

    #[test]
    fn test_grant_expiry_is_passive() {
        let mut report = report();
        grant(&mut report, "carol", AccessLevel::Read, Some(100));

        assert!(authorize(&report, &user("carol"), 99));
        assert!(!authorize(&report, &user("carol"), 100));
        assert_eq!(
            access_state(&report, &user("carol"), 150),
            AccessState::Expired {
                level: AccessLevel::Read,
                expired_at: 100
            }
        );
        // The entry itself is kept.
        assert!(report.access_control.entry(&user("carol")).is_some());
    }

    #[test]
    fn test_public_reports() {
        let mut report = report();
        report.access_control.is_public = true;
        assert_eq!(access_state(&report, &user("dave"), 0), AccessState::Public);
        assert!(!can_write(&report, &user("dave"), 0));

        grant(&mut report, "carol", AccessLevel::Write, None);
        assert!(can_write(&report, &user("carol"), 0));
    }

    #[test]
    fn test_regrant_replaces_entry() {
        let mut report = report();
        grant(&mut report, "carol", AccessLevel::Read, Some(10));
        grant(&mut report, "carol", AccessLevel::Write, None);

        assert_eq!(report.access_control.authorized_users.len(), 1);
        assert!(can_write(&report, &user("carol"), 1_000));
    }

    #[test]
    fn test_revoke_removes_immediately() {
        let mut report = report();
        grant(&mut report, "carol", AccessLevel::Read, None);
        check_revoke(&report, &user("bob"), &user("carol"), 0).unwrap();
        assert!(apply_revoke(&mut report.access_control, &user("carol")));
        assert!(!authorize(&report, &user("carol"), 0));
        assert!(!apply_revoke(&mut report.access_control, &user("carol")));
    }

    #[test]
    fn test_revoke_errors() {
        let report = report();
        assert!(matches!(
            check_revoke(&report, &user("alice"), &user("bob"), 0),
            Err(PermsError::ImplicitOwner(_))
        ));
        assert!(matches!(
            check_revoke(&report, &user("alice"), &user("carol"), 0),
            Err(PermsError::GrantNotFound(_))
        ));
        assert!(matches!(
            check_revoke(&report, &user("carol"), &user("dave"), 0),
            Err(PermsError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_grant_policy() {
        let mut report = report();
        grant(&mut report, "carol", AccessLevel::Admin, None);
        grant(&mut report, "erin", AccessLevel::Read, None);

        // Delegated admin may grant read/write but not admin.
        assert!(check_grant(&report, &user("carol"), &user("dave"), AccessLevel::Write, None, 0).is_ok());
        assert!(matches!(
            check_grant(&report, &user("carol"), &user("dave"), AccessLevel::Admin, None, 0),
            Err(PermsError::PermissionDenied(_))
        ));
        // Readers cannot grant.
        assert!(matches!(
            check_grant(&report, &user("erin"), &user("dave"), AccessLevel::Read, None, 0),
            Err(PermsError::PermissionDenied(_))
        ));
        // Owners are not grant targets.
        assert!(matches!(
            check_grant(&report, &user("alice"), &user("bob"), AccessLevel::Read, None, 0),
            Err(PermsError::ImplicitOwner(_))
        ));
        // Expiry must be in the future.
        assert!(matches!(
            check_grant(&report, &user("alice"), &user("dave"), AccessLevel::Read, Some(5), 5),
            Err(PermsError::InvalidGrant(_))
        ));
    }

    #[test]
    fn test_expired_admin_cannot_manage() {
        let mut report = report();
        grant(&mut report, "carol", AccessLevel::Admin, Some(10));
        assert!(can_manage(&report, &user("carol"), 9));
        assert!(!can_manage(&report, &user("carol"), 10));
    }
}
