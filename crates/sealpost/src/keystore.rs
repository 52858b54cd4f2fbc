//! Per-user key management.
//!
//! Keypairs are created lazily the first time a user takes part in a report.
//! First use is serialized per user, and the repository's conditional insert
//! means an already-minted keypair is never overwritten, even across
//! processes sharing one database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use sealpost_core::{Clock, UserId};
use sealpost_perms::{Entropy, PrivateKeyMaterial, PublicKeyMaterial, UserKeyPair};
use sealpost_store::KeyRepository;

use crate::error::{EngineError, Result};

/// Key store over a [`KeyRepository`].
pub struct KeyStore<R> {
    repo: Arc<R>,
    entropy: Arc<dyn Entropy>,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<R: KeyRepository> KeyStore<R> {
    pub fn new(repo: Arc<R>, entropy: Arc<dyn Entropy>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            entropy,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Return the user's keypair, generating and persisting one if absent.
    ///
    /// Fails with `KeyGenerationFailed` when entropy is unavailable; no
    /// placeholder key is ever stored.
    pub async fn ensure_key_pair(&self, user: &UserId) -> Result<UserKeyPair> {
        if let Some(existing) = self.repo.get_keypair(user).await? {
            return Ok(existing);
        }

        let lock = self.user_lock(user);
        let result = {
            let _guard = lock.lock().await;
            self.mint_if_absent(user).await
        };
        self.release_user_lock(user, lock);
        result
    }

    async fn mint_if_absent(&self, user: &UserId) -> Result<UserKeyPair> {
        if let Some(existing) = self.repo.get_keypair(user).await? {
            return Ok(existing);
        }

        let generated = UserKeyPair::generate(user.clone(), &*self.entropy, self.clock.now_millis())?;
        let stored = self.repo.insert_keypair_if_absent(&generated).await?;

        if stored.public_key() == generated.public_key() {
            info!(user_id = %user, "generated keypair");
        } else {
            debug!(user_id = %user, "keypair created concurrently elsewhere, keeping stored one");
        }
        Ok(stored)
    }

    /// The user's active keypair.
    pub async fn key_pair(&self, user: &UserId) -> Result<UserKeyPair> {
        self.repo
            .get_keypair(user)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(user.clone()))
    }

    /// Public half of the user's keypair.
    pub async fn export_public(&self, user: &UserId) -> Result<PublicKeyMaterial> {
        Ok(self.key_pair(user).await?.public_key())
    }

    /// Private half, released only to its owner.
    pub async fn export_private(&self, caller: &UserId, user: &UserId) -> Result<PrivateKeyMaterial> {
        if caller != user {
            return Err(EngineError::AccessDenied(format!(
                "{caller} may not read the private key of {user}"
            )));
        }
        Ok(self.key_pair(user).await?.secret_key().clone())
    }

    fn user_lock(&self, user: &UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(user.clone()).or_default().clone()
    }

    /// Drop the caller's handle and forget the lock once nobody else holds
    /// or waits on it. Handles are only cloned under the map lock, so a
    /// count of one means the map holds the last reference.
    fn release_user_lock(&self, user: &UserId, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(lock);
        if locks.get(user).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(user);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
