//! User directory: the engine's view of who exists.
//!
//! Registration and authentication live outside the engine. The engine only
//! asks whether a user id is known and which role it carries.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sealpost_core::UserId;

/// Role of a registered user. Informational; any role may send reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    HealthcareProvider,
    InsuranceProvider,
}

/// A directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: UserId,
    pub role: Role,
}

impl UserRecord {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Lookup of registered users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by id.
    async fn lookup_user(&self, user_id: &UserId) -> Option<UserRecord>;
}

/// In-memory directory.
#[derive(Default)]
pub struct MemoryDirectory {
    users: RwLock<HashMap<UserId, UserRecord>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from a fixed set of users.
    pub fn with_users(users: impl IntoIterator<Item = UserRecord>) -> Self {
        let directory = Self::new();
        for user in users {
            directory.insert(user);
        }
        directory
    }

    /// Add or replace a user.
    pub fn insert(&self, user: UserRecord) {
        let mut users = self
            .users
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        users.insert(user.user_id.clone(), user);
    }

    /// Remove a user. Returns the removed record.
    pub fn remove(&self, user_id: &UserId) -> Option<UserRecord> {
        self.users
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(user_id)
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn lookup_user(&self, user_id: &UserId) -> Option<UserRecord> {
        self.users
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(user_id)
            .cloned()
    }
}
