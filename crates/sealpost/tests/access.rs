//! Grants, expiry, revocation, public visibility and concurrent ACL updates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use sealpost::core::{AuthorizedUser, ViewRecord};
use sealpost::perms::UserKeyPair;
use sealpost::store::{
    KeyRepository, MemoryStore, ReportCheck, ReportStore, SqliteStore, StoreError,
};
use sealpost::{
    AccessLevel, AccessState, EngineError, MetadataPatch, Priority, Report, ReportId,
    ReportStatus, UserId,
};
use sealpost_testkit::{user, TestWorld, START_MILLIS};

const HOUR: i64 = 60 * 60 * 1000;

#[tokio::test]
async fn test_expiring_grant() {
    let world = TestWorld::new();
    let (alice, carol) = (user("alice"), user("carol"));
    let report = world.send("alice", "bob", b"mri findings").await.unwrap();
    let expires_at = START_MILLIS + HOUR;

    world
        .engine
        .grant_access(&report.report_id, &alice, &carol, AccessLevel::Read, Some(expires_at))
        .await
        .unwrap();

    let view = world.engine.get_report(&report.report_id, &carol).await.unwrap();
    assert!(view.plaintext.is_none());
    assert_eq!(
        view.access,
        AccessState::Granted {
            level: AccessLevel::Read,
            expires_at: Some(expires_at)
        }
    );

    // Live strictly before the expiry instant.
    world.clock.set(expires_at - 1);
    world.engine.get_report(&report.report_id, &carol).await.unwrap();

    world.clock.set(expires_at);
    assert!(matches!(
        world.engine.get_report(&report.report_id, &carol).await,
        Err(EngineError::AccessDenied(_))
    ));
    assert!(matches!(
        world.engine.verify_integrity(&report.report_id, &carol).await,
        Err(EngineError::AccessDenied(_))
    ));

    // Expiry is passive: the entry stays until revoked.
    let stored = world.store.get_report(&report.report_id).await.unwrap().unwrap();
    assert!(stored.access_control.entry(&carol).is_some());
    assert_eq!(
        sealpost::perms::access_state(&stored, &carol, expires_at),
        AccessState::Expired {
            level: AccessLevel::Read,
            expired_at: expires_at
        }
    );
}

#[tokio::test]
async fn test_revocation_is_immediate() {
    let world = TestWorld::new();
    let (alice, bob, carol) = (user("alice"), user("bob"), user("carol"));
    let report = world.send("alice", "bob", b"results").await.unwrap();

    world
        .engine
        .grant_access(&report.report_id, &bob, &carol, AccessLevel::Read, None)
        .await
        .unwrap();
    world.engine.get_report(&report.report_id, &carol).await.unwrap();

    let updated = world
        .engine
        .revoke_access(&report.report_id, &alice, &carol)
        .await
        .unwrap();
    assert!(updated.access_control.authorized_users.is_empty());
    assert!(matches!(
        world.engine.get_report(&report.report_id, &carol).await,
        Err(EngineError::AccessDenied(_))
    ));

    assert!(matches!(
        world.engine.revoke_access(&report.report_id, &alice, &carol).await,
        Err(EngineError::InvalidOperation(_))
    ));
}

#[tokio::test]
async fn test_owners_always_authorized() {
    let world = TestWorld::new();
    let (alice, bob) = (user("alice"), user("bob"));
    let report = world.send("alice", "bob", b"x").await.unwrap();

    for owner in [&alice, &bob] {
        assert!(matches!(
            world
                .engine
                .grant_access(&report.report_id, &alice, owner, AccessLevel::Read, None)
                .await,
            Err(EngineError::InvalidOperation(_))
        ));
        assert!(matches!(
            world.engine.revoke_access(&report.report_id, &alice, owner).await,
            Err(EngineError::InvalidOperation(_))
        ));
    }

    world.clock.advance(Duration::from_secs(365 * 24 * 3600));
    world.engine.get_report(&report.report_id, &alice).await.unwrap();
    world.engine.get_report(&report.report_id, &bob).await.unwrap();
}

#[tokio::test]
async fn test_grant_rules() {
    let world = TestWorld::new();
    let (alice, carol, dave) = (user("alice"), user("carol"), user("dave"));
    let report = world.send("alice", "bob", b"x").await.unwrap();
    let id = report.report_id;

    // Expiry must lie in the future.
    assert!(matches!(
        world
            .engine
            .grant_access(&id, &alice, &carol, AccessLevel::Read, Some(START_MILLIS))
            .await,
        Err(EngineError::InvalidOperation(_))
    ));

    // Target must be a registered user.
    assert!(matches!(
        world
            .engine
            .grant_access(&id, &alice, &user("zed"), AccessLevel::Read, None)
            .await,
        Err(EngineError::UserNotFound(_))
    ));

    // Strangers and read grantees cannot manage.
    assert!(matches!(
        world.engine.grant_access(&id, &carol, &dave, AccessLevel::Read, None).await,
        Err(EngineError::AccessDenied(_))
    ));
    world
        .engine
        .grant_access(&id, &alice, &carol, AccessLevel::Read, None)
        .await
        .unwrap();
    assert!(matches!(
        world.engine.grant_access(&id, &carol, &dave, AccessLevel::Read, None).await,
        Err(EngineError::AccessDenied(_))
    ));

    // Re-granting replaces the entry.
    let updated = world
        .engine
        .grant_access(&id, &alice, &carol, AccessLevel::Admin, None)
        .await
        .unwrap();
    assert_eq!(updated.access_control.authorized_users.len(), 1);
    assert_eq!(
        updated.access_control.entry(&carol).unwrap().access_level,
        AccessLevel::Admin
    );

    // A non-owner admin manages lesser grants only.
    world
        .engine
        .grant_access(&id, &carol, &dave, AccessLevel::Write, None)
        .await
        .unwrap();
    assert!(matches!(
        world.engine.grant_access(&id, &carol, &dave, AccessLevel::Admin, None).await,
        Err(EngineError::AccessDenied(_))
    ));
    world.engine.revoke_access(&id, &carol, &dave).await.unwrap();
}

#[tokio::test]
async fn test_public_reports() {
    let world = TestWorld::new();
    let (alice, carol, dave) = (user("alice"), user("carol"), user("dave"));
    let report = world.send("alice", "bob", b"newsletter").await.unwrap();
    let id = report.report_id;

    assert!(matches!(
        world.engine.set_public(&id, &carol, true).await,
        Err(EngineError::AccessDenied(_))
    ));

    let updated = world.engine.set_public(&id, &alice, true).await.unwrap();
    assert!(updated.access_control.is_public);

    let view = world.engine.get_report(&id, &dave).await.unwrap();
    assert_eq!(view.access, AccessState::Public);
    assert!(view.plaintext.is_none());

    // A live grant outranks the public flag.
    world
        .engine
        .grant_access(&id, &alice, &carol, AccessLevel::Write, None)
        .await
        .unwrap();
    let view = world.engine.get_report(&id, &carol).await.unwrap();
    assert!(matches!(
        view.access,
        AccessState::Granted {
            level: AccessLevel::Write,
            ..
        }
    ));

    // Public readers still cannot write.
    assert!(matches!(
        world
            .engine
            .update_metadata(
                &id,
                &dave,
                &sealpost::MetadataPatch {
                    priority: Some(sealpost::Priority::Low),
                    ..Default::default()
                }
            )
            .await,
        Err(EngineError::AccessDenied(_))
    ));

    world.engine.set_public(&id, &alice, false).await.unwrap();
    assert!(matches!(
        world.engine.get_report(&id, &dave).await,
        Err(EngineError::AccessDenied(_))
    ));
}

#[tokio::test]
async fn test_missing_report() {
    let world = TestWorld::new();
    let missing = sealpost::ReportId::from_bytes([7; 16]);
    assert!(matches!(
        world.engine.get_report(&missing, &user("alice")).await,
        Err(EngineError::ReportNotFound(_))
    ));
    assert!(matches!(
        world
            .engine
            .grant_access(&missing, &user("alice"), &user("bob"), AccessLevel::Read, None)
            .await,
        Err(EngineError::ReportNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_grants_all_retained() {
    let world = Arc::new(TestWorld::new());
    let report = world.send("alice", "bob", b"x").await.unwrap();
    let id = report.report_id;

    let mut handles = Vec::new();
    for (target, level) in [("carol", AccessLevel::Read), ("dave", AccessLevel::Write)] {
        let world = world.clone();
        handles.push(tokio::spawn(async move {
            world
                .engine
                .grant_access(&id, &user("alice"), &user(target), level, None)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = world.store.get_report(&id).await.unwrap().unwrap();
    assert_eq!(stored.access_control.authorized_users.len(), 2);
    assert_eq!(
        stored.access_control.entry(&user("dave")).unwrap().access_level,
        AccessLevel::Write
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_grants_on_sqlite() {
    let world = Arc::new(TestWorld::with_store(SqliteStore::open_memory().unwrap()));
    let report = world.send("alice", "bob", b"x").await.unwrap();
    let id = report.report_id;

    let mut handles = Vec::new();
    for target in ["carol", "dave"] {
        let world = world.clone();
        handles.push(tokio::spawn(async move {
            world
                .engine
                .grant_access(&id, &user("bob"), &user(target), AccessLevel::Read, None)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for target in ["carol", "dave"] {
        world.engine.get_report(&id, &user(target)).await.unwrap();
    }
    let views = world.engine.views(&id, &user("alice")).await.unwrap();
    assert_eq!(views.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_key_use() {
    let world = Arc::new(TestWorld::new());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let world = world.clone();
        handles.push(tokio::spawn(async move {
            world.engine.ensure_key_pair(&user("dave")).await
        }));
    }

    let mut keys = Vec::new();
    for handle in handles {
        keys.push(handle.await.unwrap().unwrap());
    }
    assert!(keys.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(world.engine.export_public_key(&user("dave")).await.unwrap(), keys[0]);
}

/// Memory store that can hold the next grant or metadata write at the store
/// boundary, after the engine's own permission check has passed.
#[derive(Default)]
struct PausingStore {
    inner: MemoryStore,
    armed: AtomicBool,
    paused: Notify,
    resume: Notify,
}

impl PausingStore {
    fn pause_next_write(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    async fn hold_if_armed(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.paused.notify_one();
            self.resume.notified().await;
        }
    }
}

type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
impl ReportStore for PausingStore {
    async fn insert_report(&self, report: &Report) -> StoreResult<()> {
        self.inner.insert_report(report).await
    }

    async fn get_report(&self, id: &ReportId) -> StoreResult<Option<Report>> {
        self.inner.get_report(id).await
    }

    async fn reports_sent_by(&self, user: &UserId) -> StoreResult<Vec<Report>> {
        self.inner.reports_sent_by(user).await
    }

    async fn reports_received_by(&self, user: &UserId) -> StoreResult<Vec<Report>> {
        self.inner.reports_received_by(user).await
    }

    async fn report_count(&self) -> StoreResult<usize> {
        self.inner.report_count().await
    }

    async fn put_grant(
        &self,
        id: &ReportId,
        grant: &AuthorizedUser,
        now: i64,
        check: ReportCheck,
    ) -> StoreResult<Report> {
        self.hold_if_armed().await;
        self.inner.put_grant(id, grant, now, check).await
    }

    async fn remove_grant(
        &self,
        id: &ReportId,
        user: &UserId,
        now: i64,
        check: ReportCheck,
    ) -> StoreResult<bool> {
        self.inner.remove_grant(id, user, now, check).await
    }

    async fn set_public(&self, id: &ReportId, is_public: bool, now: i64) -> StoreResult<Report> {
        self.inner.set_public(id, is_public, now).await
    }

    async fn update_status(
        &self,
        id: &ReportId,
        next: ReportStatus,
        now: i64,
    ) -> StoreResult<Report> {
        self.inner.update_status(id, next, now).await
    }

    async fn update_metadata(
        &self,
        id: &ReportId,
        patch: &MetadataPatch,
        now: i64,
        check: ReportCheck,
    ) -> StoreResult<Report> {
        self.hold_if_armed().await;
        self.inner.update_metadata(id, patch, now, check).await
    }

    async fn append_view(&self, id: &ReportId, view: &ViewRecord) -> StoreResult<()> {
        self.inner.append_view(id, view).await
    }
}

#[async_trait]
impl KeyRepository for PausingStore {
    async fn insert_keypair_if_absent(&self, pair: &UserKeyPair) -> StoreResult<UserKeyPair> {
        self.inner.insert_keypair_if_absent(pair).await
    }

    async fn get_keypair(&self, user: &UserId) -> StoreResult<Option<UserKeyPair>> {
        self.inner.get_keypair(user).await
    }

    async fn replace_keypair(&self, pair: &UserKeyPair, now: i64) -> StoreResult<()> {
        self.inner.replace_keypair(pair, now).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_admin_revoked_mid_grant_cannot_commit() {
    let world = Arc::new(TestWorld::with_store(PausingStore::default()));
    let (alice, carol, dave) = (user("alice"), user("carol"), user("dave"));
    let report = world.send("alice", "bob", b"echo").await.unwrap();
    let id = report.report_id;

    world
        .engine
        .grant_access(&id, &alice, &carol, AccessLevel::Admin, None)
        .await
        .unwrap();

    world.store.pause_next_write();
    let pending = {
        let world = world.clone();
        tokio::spawn(async move {
            world
                .engine
                .grant_access(&id, &user("carol"), &user("dave"), AccessLevel::Write, None)
                .await
        })
    };

    // Carol passed the up-front check; revoke her before the write lands.
    world.store.paused.notified().await;
    world.engine.revoke_access(&id, &alice, &carol).await.unwrap();
    world.store.resume.notify_one();

    assert!(matches!(
        pending.await.unwrap(),
        Err(EngineError::AccessDenied(_))
    ));
    let stored = world.store.get_report(&id).await.unwrap().unwrap();
    assert!(stored.access_control.entry(&carol).is_none());
    assert!(stored.access_control.entry(&dave).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_writer_revoked_mid_edit_cannot_commit() {
    let world = Arc::new(TestWorld::with_store(PausingStore::default()));
    let (alice, carol) = (user("alice"), user("carol"));
    let report = world.send("alice", "bob", b"scan").await.unwrap();
    let id = report.report_id;

    world
        .engine
        .grant_access(&id, &alice, &carol, AccessLevel::Write, None)
        .await
        .unwrap();

    world.store.pause_next_write();
    let pending = {
        let world = world.clone();
        tokio::spawn(async move {
            let patch = MetadataPatch {
                priority: Some(Priority::Urgent),
                ..Default::default()
            };
            world.engine.update_metadata(&id, &user("carol"), &patch).await
        })
    };

    world.store.paused.notified().await;
    world.engine.revoke_access(&id, &alice, &carol).await.unwrap();
    world.store.resume.notify_one();

    assert!(matches!(
        pending.await.unwrap(),
        Err(EngineError::AccessDenied(_))
    ));
    let stored = world.store.get_report(&id).await.unwrap().unwrap();
    assert_eq!(stored.metadata, report.metadata);
}
