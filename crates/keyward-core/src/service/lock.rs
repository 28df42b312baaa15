// Lock coordinator
// Forwards lock/unlock/check to the state store selected at startup

use std::sync::Arc;
use std::time::Duration;

use keyward_common::StorageMode;
use tracing::{debug, info};

use crate::error::LockError;
use crate::model::{LockState, LockToken};
use crate::store::StateStore;

/// Entry point for lock operations; backend-agnostic
#[derive(Clone)]
pub struct LockCoordinator {
    store: Arc<dyn StateStore>,
}

impl LockCoordinator {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        info!(
            storage_mode = %store.storage_mode(),
            default_lease_ms = store.default_lease().as_millis() as u64,
            "LockCoordinator initialized"
        );
        Self { store }
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.store.storage_mode()
    }

    /// Acquire every key for `holder` or none of them
    ///
    /// Returns `LockError::AlreadyLocked` when any key is held by someone else.
    pub async fn lock(
        &self,
        holder: &str,
        keys: &[String],
        lease: Option<Duration>,
    ) -> Result<Vec<LockToken>, LockError> {
        let result = self.store.lock(holder, keys, lease).await;
        match &result {
            Ok(tokens) => debug!(holder = %holder, count = tokens.len(), "Lock granted"),
            Err(e) => debug!(holder = %holder, keys = ?keys, error = %e, "Lock refused"),
        }
        result
    }

    /// Release the keys whose tokens are still current; returns the keys released
    pub async fn unlock(
        &self,
        holder: &str,
        tokens: &[LockToken],
    ) -> Result<Vec<String>, LockError> {
        let released = self.store.unlock(holder, tokens).await?;
        debug!(
            holder = %holder,
            requested = tokens.len(),
            released = released.len(),
            "Unlock processed"
        );
        Ok(released)
    }

    /// Whether any of `keys` is locked
    pub async fn check(&self, keys: &[String]) -> Result<bool, LockError> {
        self.store.check(keys).await
    }

    pub async fn states(&self, keys: &[String]) -> Result<Vec<LockState>, LockError> {
        self.store.states(keys).await
    }

    pub async fn health_check(&self) -> Result<(), LockError> {
        self.store.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;

    fn test_coordinator() -> LockCoordinator {
        LockCoordinator::new(Arc::new(MemoryStateStore::new(Duration::from_secs(60))))
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_lock_and_unlock() {
        let coordinator = test_coordinator();
        assert_eq!(coordinator.storage_mode(), StorageMode::Memory);

        let tokens = coordinator.lock("owner1", &keys(&["key1"]), None).await.unwrap();
        assert_eq!(tokens, vec![LockToken::new("key1", 1)]);
        assert!(coordinator.check(&keys(&["key1"])).await.unwrap());

        let released = coordinator.unlock("owner1", &tokens).await.unwrap();
        assert_eq!(released, keys(&["key1"]));
        assert!(!coordinator.check(&keys(&["key1"])).await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_conflict() {
        let coordinator = test_coordinator();

        coordinator.lock("owner1", &keys(&["key1"]), None).await.unwrap();
        // Another owner cannot acquire
        let result = coordinator.lock("owner2", &keys(&["key1"]), None).await;
        assert_eq!(result, Err(LockError::AlreadyLocked));
        // Same owner can re-acquire
        assert!(coordinator.lock("owner1", &keys(&["key1"]), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_wrong_owner() {
        let coordinator = test_coordinator();

        let tokens = coordinator.lock("owner1", &keys(&["key1"]), None).await.unwrap();
        // Wrong owner cannot release
        assert!(coordinator.unlock("owner2", &tokens).await.unwrap().is_empty());
        // Correct owner can release
        assert_eq!(coordinator.unlock("owner1", &tokens).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_release_nonexistent() {
        let coordinator = test_coordinator();
        let released = coordinator
            .unlock("owner1", &[LockToken::new("nonexistent", 1)])
            .await
            .unwrap();
        assert!(released.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fencing_after_expiry() {
        let coordinator = test_coordinator();
        let lease = Some(Duration::from_millis(20));

        let stale = coordinator.lock("a", &keys(&["k"]), lease).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let fresh = coordinator.lock("b", &keys(&["k"]), None).await.unwrap();
        assert!(fresh[0].version > stale[0].version);

        assert!(coordinator.unlock("a", &stale).await.unwrap().is_empty());
        let states = coordinator.states(&keys(&["k"])).await.unwrap();
        assert!(states[0].is_held_by("b"));
    }
}
