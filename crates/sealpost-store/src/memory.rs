//! In-memory implementation of the store traits.
//!
//! This is primarily for tests and embedding. It has the same semantics as
//! SQLite but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use sealpost_core::{
    AuthorizedUser, MetadataPatch, Report, ReportId, ReportStatus, UserId, ViewRecord,
};
use sealpost_perms::{apply_grant, apply_revoke, UserKeyPair};

use crate::error::{Result, StoreError};
use crate::traits::{KeyRepository, ReportCheck, ReportStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; every
/// mutation holds the write lock for its whole read-modify-write.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Reports indexed by ID.
    reports: HashMap<ReportId, Report>,

    /// Active keypair per user.
    keys: HashMap<UserId, UserKeyPair>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Internal(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Internal(format!("lock poisoned: {e}")))
    }

    /// Run `f` against a stored report under the write lock.
    fn mutate<T>(&self, id: &ReportId, f: impl FnOnce(&mut Report) -> Result<T>) -> Result<T> {
        let mut inner = self.write()?;
        let report = inner
            .reports
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_hex()))?;
        f(report)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn insert_report(&self, report: &Report) -> Result<()> {
        let mut inner = self.write()?;
        if inner.reports.contains_key(&report.report_id) {
            return Err(StoreError::Duplicate(report.report_id.to_hex()));
        }
        inner.reports.insert(report.report_id, report.clone());
        Ok(())
    }

    async fn get_report(&self, id: &ReportId) -> Result<Option<Report>> {
        Ok(self.read()?.reports.get(id).cloned())
    }

    async fn reports_sent_by(&self, user: &UserId) -> Result<Vec<Report>> {
        let inner = self.read()?;
        Ok(inner
            .reports
            .values()
            .filter(|r| &r.sender_id == user)
            .cloned()
            .collect())
    }

    async fn reports_received_by(&self, user: &UserId) -> Result<Vec<Report>> {
        let inner = self.read()?;
        Ok(inner
            .reports
            .values()
            .filter(|r| &r.recipient_id == user)
            .cloned()
            .collect())
    }

    async fn report_count(&self) -> Result<usize> {
        Ok(self.read()?.reports.len())
    }

    async fn put_grant(
        &self,
        id: &ReportId,
        grant: &AuthorizedUser,
        now: i64,
        check: ReportCheck,
    ) -> Result<Report> {
        self.mutate(id, |report| {
            check(report)?;
            apply_grant(&mut report.access_control, grant.clone());
            report.updated_at = now;
            Ok(report.clone())
        })
    }

    async fn remove_grant(
        &self,
        id: &ReportId,
        user: &UserId,
        now: i64,
        check: ReportCheck,
    ) -> Result<bool> {
        self.mutate(id, |report| {
            check(report)?;
            let removed = apply_revoke(&mut report.access_control, user);
            if removed {
                report.updated_at = now;
            }
            Ok(removed)
        })
    }

    async fn set_public(&self, id: &ReportId, is_public: bool, now: i64) -> Result<Report> {
        self.mutate(id, |report| {
            report.access_control.is_public = is_public;
            report.updated_at = now;
            Ok(report.clone())
        })
    }

    async fn update_status(&self, id: &ReportId, next: ReportStatus, now: i64) -> Result<Report> {
        self.mutate(id, |report| {
            if !report.status.can_transition_to(next) {
                return Err(StoreError::InvalidTransition {
                    from: report.status,
                    to: next,
                });
            }
            report.status = next;
            report.updated_at = now;
            Ok(report.clone())
        })
    }

    async fn update_metadata(
        &self,
        id: &ReportId,
        patch: &MetadataPatch,
        now: i64,
        check: ReportCheck,
    ) -> Result<Report> {
        self.mutate(id, |report| {
            check(report)?;
            patch.apply(&mut report.metadata);
            report.updated_at = now;
            Ok(report.clone())
        })
    }

    async fn append_view(&self, id: &ReportId, view: &ViewRecord) -> Result<()> {
        self.mutate(id, |report| {
            report.views.push(view.clone());
            Ok(())
        })
    }
}

#[async_trait]
impl KeyRepository for MemoryStore {
    async fn insert_keypair_if_absent(&self, pair: &UserKeyPair) -> Result<UserKeyPair> {
        let mut inner = self.write()?;
        Ok(inner
            .keys
            .entry(pair.user_id().clone())
            .or_insert_with(|| pair.clone())
            .clone())
    }

    async fn get_keypair(&self, user: &UserId) -> Result<Option<UserKeyPair>> {
        Ok(self.read()?.keys.get(user).cloned())
    }

    async fn replace_keypair(&self, pair: &UserKeyPair, _now: i64) -> Result<()> {
        let mut inner = self.write()?;
        match inner.keys.get_mut(pair.user_id()) {
            Some(existing) => {
                *existing = pair.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("keypair for {}", pair.user_id()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{allow, keypair, sample_report, user};
    use proptest::prelude::*;
    use sealpost_core::AccessLevel;
    use sealpost_perms::{check_grant, PermsError};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryStore::new();
        let report = sample_report("alice", "bob");

        store.insert_report(&report).await.unwrap();
        assert_eq!(store.get_report(&report.report_id).await.unwrap(), Some(report.clone()));
        assert!(matches!(
            store.insert_report(&report).await,
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.report_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sent_and_received_indexes() {
        let store = MemoryStore::new();
        store.insert_report(&sample_report("alice", "bob")).await.unwrap();
        store.insert_report(&sample_report("bob", "alice")).await.unwrap();
        store.insert_report(&sample_report("carol", "bob")).await.unwrap();

        assert_eq!(store.reports_sent_by(&user("alice")).await.unwrap().len(), 1);
        assert_eq!(store.reports_received_by(&user("bob")).await.unwrap().len(), 2);
        assert!(store.reports_sent_by(&user("dave")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_checked_against_stored_value() {
        let store = MemoryStore::new();
        let report = sample_report("alice", "bob");
        store.insert_report(&report).await.unwrap();

        let updated = store
            .update_status(&report.report_id, ReportStatus::Approved, 50)
            .await
            .unwrap();
        assert_eq!(updated.status, ReportStatus::Approved);
        assert_eq!(updated.updated_at, 50);
        assert_eq!(updated.created_at, report.created_at);

        assert!(matches!(
            store.update_status(&report.report_id, ReportStatus::Rejected, 60).await,
            Err(StoreError::InvalidTransition {
                from: ReportStatus::Approved,
                to: ReportStatus::Rejected
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_report_is_not_found() {
        let store = MemoryStore::new();
        let id = ReportId::from_bytes([9; 16]);
        assert!(store.get_report(&id).await.unwrap().is_none());
        assert!(matches!(
            store.set_public(&id, true, 0).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_grants_are_all_retained() {
        let store = Arc::new(MemoryStore::new());
        let report = sample_report("alice", "bob");
        store.insert_report(&report).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let id = report.report_id;
            handles.push(tokio::spawn(async move {
                let grant = AuthorizedUser {
                    user_id: user(&format!("user-{i}")),
                    access_level: AccessLevel::Read,
                    granted_at: i,
                    expires_at: None,
                };
                store.put_grant(&id, &grant, i, allow()).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = store.get_report(&report.report_id).await.unwrap().unwrap();
        assert_eq!(stored.access_control.authorized_users.len(), 16);
    }

    #[tokio::test]
    async fn test_check_sees_state_at_write_time() {
        let store = MemoryStore::new();
        let report = sample_report("alice", "bob");
        let id = report.report_id;
        store.insert_report(&report).await.unwrap();

        let admin = AuthorizedUser {
            user_id: user("carol"),
            access_level: AccessLevel::Admin,
            granted_at: 1_000,
            expires_at: None,
        };
        store.put_grant(&id, &admin, 1_000, allow()).await.unwrap();

        // Carol's grant request was validated against this snapshot.
        let snapshot = store.get_report(&id).await.unwrap().unwrap();
        let grant = check_grant(
            &snapshot,
            &user("carol"),
            &user("dave"),
            AccessLevel::Write,
            None,
            1_100,
        )
        .unwrap();

        assert!(store.remove_grant(&id, &user("carol"), 1_050, allow()).await.unwrap());

        let check: ReportCheck = Arc::new(|stored: &Report| {
            check_grant(stored, &user("carol"), &user("dave"), AccessLevel::Write, None, 1_100)
                .map(drop)
        });
        assert!(matches!(
            store.put_grant(&id, &grant, 1_100, check).await,
            Err(StoreError::Refused(PermsError::PermissionDenied(_)))
        ));

        let deny: ReportCheck =
            Arc::new(|_: &Report| Err(PermsError::PermissionDenied("revoked".into())));
        let patch = MetadataPatch {
            tags: Some(vec!["late".into()]),
            ..Default::default()
        };
        assert!(matches!(
            store.update_metadata(&id, &patch, 1_100, deny).await,
            Err(StoreError::Refused(_))
        ));

        let stored = store.get_report(&id).await.unwrap().unwrap();
        assert!(stored.access_control.authorized_users.is_empty());
        assert_eq!(stored.updated_at, 1_050);
        assert_eq!(stored.metadata, report.metadata);
    }

    #[tokio::test]
    async fn test_keypair_insert_if_absent_keeps_first() {
        let store = MemoryStore::new();
        let first = keypair("alice");
        let second = keypair("alice");

        let stored = store.insert_keypair_if_absent(&first).await.unwrap();
        assert_eq!(stored.public_key(), first.public_key());

        let stored = store.insert_keypair_if_absent(&second).await.unwrap();
        assert_eq!(stored.public_key(), first.public_key());

        store.replace_keypair(&second, 2_000).await.unwrap();
        let current = store.get_keypair(&user("alice")).await.unwrap().unwrap();
        assert_eq!(current.public_key(), second.public_key());

        assert!(matches!(
            store.replace_keypair(&keypair("zed"), 2_000).await,
            Err(StoreError::NotFound(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn grants_hold_one_entry_per_user(ops in prop::collection::vec((0u8..4, any::<bool>()), 1..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = MemoryStore::new();
                let report = sample_report("alice", "bob");
                store.insert_report(&report).await.unwrap();

                for (i, (who, grant)) in ops.iter().enumerate() {
                    let target = user(&format!("u{who}"));
                    if *grant {
                        let entry = AuthorizedUser {
                            user_id: target,
                            access_level: AccessLevel::Read,
                            granted_at: i as i64,
                            expires_at: None,
                        };
                        store.put_grant(&report.report_id, &entry, i as i64, allow()).await.unwrap();
                    } else {
                        store.remove_grant(&report.report_id, &target, i as i64, allow()).await.unwrap();
                    }
                }

                let stored = store.get_report(&report.report_id).await.unwrap().unwrap();
                let users = &stored.access_control.authorized_users;
                for entry in users {
                    assert_eq!(users.iter().filter(|g| g.user_id == entry.user_id).count(), 1);
                }
            });
        }
    }
}
