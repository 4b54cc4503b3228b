/// Self-Destruct Guard
///
/// A durable failure counter that is independent of the PIN lockout. The
/// lockout only slows an attacker down; this counter caps the total number
/// of wrong guesses. Once the threshold is reached every secret the core
/// owns is erased:
///
/// 1. the identity record
/// 2. credential material (hash, salt, derived key, attempt and lock state)
/// 3. every group key, then the group index
/// 4. the counter itself
///
/// A crash part-way through leaves the device "more erased", never with
/// an identity whose credential is already gone.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::SelfDestructConfig;
use crate::group_keys;
use crate::storage::{self, keys, KeyValueStore, StorageError};

#[derive(Error, Debug)]
pub enum SelfDestructError {
    #[error("Self-destruct counter storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, SelfDestructError>;

/// What a recorded failure led to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Counted; `remaining` failures are left before the wipe
    Counted { failures: u32, remaining: u32 },
    /// Threshold reached and the wipe ran
    Triggered(WipeReport),
    /// Guard disabled by configuration; nothing was counted
    Disabled,
}

impl FailureOutcome {
    pub fn triggered(&self) -> bool {
        matches!(self, FailureOutcome::Triggered(_))
    }
}

/// Outcome of a wipe. Erasure continues past individual failures, so the
/// report lists every record that could not be deleted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WipeReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

impl WipeReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    async fn erase(&mut self, store: &dyn KeyValueStore, key: &str) {
        match store.delete(key).await {
            Ok(()) => self.deleted.push(key.to_string()),
            Err(e) => {
                log::warn!("Wipe: failed to delete {}: {}", key, e);
                self.failed.push(key.to_string());
            }
        }
    }
}

pub struct SelfDestructGuard {
    store: Arc<dyn KeyValueStore>,
    config: SelfDestructConfig,
    counter_lock: Mutex<()>,
}

impl SelfDestructGuard {
    pub fn new(store: Arc<dyn KeyValueStore>, config: SelfDestructConfig) -> Self {
        Self {
            store,
            config,
            counter_lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn threshold(&self) -> u32 {
        self.config.threshold
    }

    /// Count one failed PIN check, wiping when the threshold is reached
    pub async fn record_failure(&self) -> Result<FailureOutcome> {
        if !self.config.enabled {
            return Ok(FailureOutcome::Disabled);
        }

        let _guard = self.counter_lock.lock().await;

        let failures =
            storage::get_u32(self.store.as_ref(), keys::SELF_DESTRUCT_FAILURES).await? + 1;

        if failures >= self.config.threshold {
            log::warn!(
                "Self-destruct threshold reached ({} failures), wiping",
                failures
            );
            let report = self.wipe_locked().await;
            return Ok(FailureOutcome::Triggered(report));
        }

        storage::set_u32(self.store.as_ref(), keys::SELF_DESTRUCT_FAILURES, failures).await?;
        log::debug!(
            "Self-destruct counter at {}/{}",
            failures,
            self.config.threshold
        );

        Ok(FailureOutcome::Counted {
            failures,
            remaining: self.config.threshold - failures,
        })
    }

    /// Erase every secret the core owns
    pub async fn wipe(&self) -> WipeReport {
        let _guard = self.counter_lock.lock().await;
        self.wipe_locked().await
    }

    async fn wipe_locked(&self) -> WipeReport {
        let store = self.store.as_ref();
        let mut report = WipeReport::default();

        report.erase(store, keys::IDENTITY).await;

        for key in keys::CREDENTIAL_RECORDS {
            report.erase(store, key).await;
        }

        match group_keys::load_index(store).await {
            Ok(group_ids) => {
                for group_id in &group_ids {
                    report.erase(store, &keys::group_key(group_id)).await;
                }
            }
            Err(e) => {
                log::warn!("Wipe: group index unreadable: {}", e);
                report.failed.push(keys::GROUP_KEY_INDEX.to_string());
            }
        }
        report.erase(store, keys::GROUP_KEY_INDEX).await;

        report.erase(store, keys::SELF_DESTRUCT_FAILURES).await;

        if report.is_complete() {
            log::warn!("Wipe complete: {} records erased", report.deleted.len());
        } else {
            log::error!(
                "Wipe incomplete: {} records could not be erased",
                report.failed.len()
            );
        }
        report
    }

    /// Clear the counter after a successful PIN check
    pub async fn reset_failures(&self) -> Result<()> {
        let _guard = self.counter_lock.lock().await;
        self.store.delete(keys::SELF_DESTRUCT_FAILURES).await?;
        Ok(())
    }

    pub async fn failure_count(&self) -> Result<u32> {
        Ok(storage::get_u32(self.store.as_ref(), keys::SELF_DESTRUCT_FAILURES).await?)
    }

    /// Failures left before the wipe; `None` when the guard is disabled
    pub async fn remaining_attempts(&self) -> Result<Option<u32>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let failures = self.failure_count().await?;
        Ok(Some(self.config.threshold.saturating_sub(failures)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    fn guard_with(store: Arc<dyn KeyValueStore>, threshold: u32) -> SelfDestructGuard {
        SelfDestructGuard::new(
            store,
            SelfDestructConfig {
                enabled: true,
                threshold,
            },
        )
    }

    async fn seed_secrets(store: &dyn KeyValueStore) {
        store.set(keys::IDENTITY, b"{}").await.unwrap();
        for key in keys::CREDENTIAL_RECORDS {
            store.set(key, b"x").await.unwrap();
        }
        store.set(&keys::group_key("g1"), &[1u8; 32]).await.unwrap();
        store.set(&keys::group_key("g2"), &[2u8; 32]).await.unwrap();
        store
            .set(keys::GROUP_KEY_INDEX, br#"["g1","g2"]"#)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_counts_until_threshold() {
        let store = Arc::new(MemoryStore::new());
        let guard = guard_with(store.clone(), 3);

        assert_eq!(
            guard.record_failure().await.unwrap(),
            FailureOutcome::Counted {
                failures: 1,
                remaining: 2
            }
        );
        assert_eq!(guard.remaining_attempts().await.unwrap(), Some(2));
        guard.record_failure().await.unwrap();
        assert!(guard.record_failure().await.unwrap().triggered());
        assert_eq!(guard.failure_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wipe_erases_everything() {
        let store = Arc::new(MemoryStore::new());
        seed_secrets(store.as_ref()).await;
        let guard = guard_with(store.clone(), 10);
        guard.record_failure().await.unwrap();

        let report = guard.wipe().await;

        assert!(report.is_complete());
        assert_eq!(report.deleted.first().map(String::as_str), Some(keys::IDENTITY));
        assert_eq!(
            report.deleted.last().map(String::as_str),
            Some(keys::SELF_DESTRUCT_FAILURES)
        );
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_reset_failures() {
        let store = Arc::new(MemoryStore::new());
        let guard = guard_with(store, 10);

        guard.record_failure().await.unwrap();
        guard.record_failure().await.unwrap();
        guard.reset_failures().await.unwrap();

        assert_eq!(guard.failure_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_guard_never_triggers() {
        let store = Arc::new(MemoryStore::new());
        seed_secrets(store.as_ref()).await;
        let guard = SelfDestructGuard::new(
            store.clone(),
            SelfDestructConfig {
                enabled: false,
                threshold: 1,
            },
        );

        for _ in 0..5 {
            assert_eq!(
                guard.record_failure().await.unwrap(),
                FailureOutcome::Disabled
            );
        }
        assert!(store.get(keys::IDENTITY).await.unwrap().is_some());
        assert_eq!(guard.remaining_attempts().await.unwrap(), None);
    }

    /// Store whose deletes fail for one chosen key
    struct FlakyStore {
        inner: MemoryStore,
        broken_key: &'static str,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> storage::Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &[u8]) -> storage::Result<()> {
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> storage::Result<()> {
            if key == self.broken_key {
                return Err(StorageError::Backend("device busy".into()));
            }
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_wipe_continues_past_failures() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            broken_key: keys::CREDENTIAL_SALT,
        });
        seed_secrets(store.as_ref()).await;
        let guard = guard_with(store.clone(), 10);

        let report = guard.wipe().await;

        assert_eq!(report.failed, vec![keys::CREDENTIAL_SALT.to_string()]);
        assert!(store.get(keys::IDENTITY).await.unwrap().is_none());
        assert!(store.get(&keys::group_key("g2")).await.unwrap().is_none());
        assert_eq!(store.inner.record_names().await, vec![keys::CREDENTIAL_SALT]);
    }
}
