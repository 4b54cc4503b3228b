/// Per-Group Symmetric Keys
///
/// One random 32-byte key per conversation, created lazily on first use.
/// Rotation replaces the key outright: ciphertexts sealed under the old
/// key become permanently unreadable, and history is not re-encrypted.
///
/// Creation is check-then-act under a per-group lock so concurrent first
/// callers for an unseen group all observe the same key.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::storage::{keys, KeyValueStore, StorageError};
use totem_protocol::crypto::encryption::{self, KEY_SIZE};

#[derive(Error, Debug)]
pub enum GroupKeyError {
    #[error("Invalid group id")]
    InvalidGroupId,
    #[error("No key for group {0}")]
    UnknownGroup(String),
    #[error("Group message could not be decrypted")]
    DecryptionError,
    #[error("Group message could not be encrypted")]
    EncryptionError,
    #[error("Group key storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, GroupKeyError>;

pub type GroupKey = Zeroizing<[u8; KEY_SIZE]>;

pub struct GroupKeyStore {
    store: Arc<dyn KeyValueStore>,
    /// One lock per group id with an operation in flight; pruned when idle
    group_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    index_lock: Mutex<()>,
}

impl GroupKeyStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            group_locks: Mutex::new(HashMap::new()),
            index_lock: Mutex::new(()),
        }
    }

    /// Return the group's key, generating and persisting one if absent
    pub async fn get_or_create_group_key(&self, group_id: &str) -> Result<GroupKey> {
        validate_group_id(group_id)?;
        let lock = self.lock_for(group_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.read_or_create(group_id).await
        };
        self.release_lock(group_id, lock).await;
        result
    }

    async fn read_or_create(&self, group_id: &str) -> Result<GroupKey> {
        if let Some(key) = self.read_key(group_id).await? {
            return Ok(key);
        }

        let key = Zeroizing::new(encryption::generate_key());
        self.write_key(group_id, &key).await?;
        log::info!("Created key for group {}", short_id(group_id));
        Ok(key)
    }

    /// Replace the group's key unconditionally
    pub async fn regenerate_group_key(&self, group_id: &str) -> Result<GroupKey> {
        validate_group_id(group_id)?;
        let lock = self.lock_for(group_id).await;
        let result = {
            let _guard = lock.lock().await;
            let key = Zeroizing::new(encryption::generate_key());
            self.write_key(group_id, &key).await.map(|()| key)
        };
        self.release_lock(group_id, lock).await;

        if result.is_ok() {
            log::warn!(
                "Rotated key for group {}; earlier messages are no longer readable",
                short_id(group_id)
            );
        }
        result
    }

    /// Encrypt a message for the group, creating the key on first use
    ///
    /// # Returns
    /// base64(nonce || ciphertext || tag)
    pub async fn encrypt(&self, group_id: &str, plaintext: &[u8]) -> Result<String> {
        let key = self.get_or_create_group_key(group_id).await?;
        encryption::encrypt_for_group(key.as_ref(), plaintext)
            .map_err(|_| GroupKeyError::EncryptionError)
    }

    /// Decrypt a message produced by `encrypt`
    ///
    /// Never creates a key: a group without one cannot have sent anything.
    pub async fn decrypt(&self, group_id: &str, encoded: &str) -> Result<Vec<u8>> {
        validate_group_id(group_id)?;
        let key = self
            .read_key(group_id)
            .await?
            .ok_or_else(|| GroupKeyError::UnknownGroup(group_id.to_string()))?;
        encryption::decrypt_for_group(key.as_ref(), encoded)
            .map_err(|_| GroupKeyError::DecryptionError)
    }

    pub async fn has_group_key(&self, group_id: &str) -> Result<bool> {
        Ok(self.store.get(&keys::group_key(group_id)).await?.is_some())
    }

    /// Ids of every group that has a key
    pub async fn group_ids(&self) -> Result<Vec<String>> {
        Ok(load_index(self.store.as_ref()).await?)
    }

    async fn lock_for(&self, group_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.group_locks.lock().await;
        locks
            .entry(group_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop our handle and forget the lock once no other caller holds it.
    ///
    /// Handles are only cloned under the map lock, so a count of one here
    /// means nobody is waiting on this group.
    async fn release_lock(&self, group_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.group_locks.lock().await;
        drop(lock);
        if locks
            .get(group_id)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            locks.remove(group_id);
        }
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.group_locks.lock().await.len()
    }

    async fn read_key(&self, group_id: &str) -> Result<Option<GroupKey>> {
        let name = keys::group_key(group_id);
        let Some(bytes) = self.store.get(&name).await? else {
            return Ok(None);
        };
        let bytes = Zeroizing::new(bytes);

        if bytes.len() != KEY_SIZE {
            return Err(StorageError::corrupted(&name, "group key has wrong length").into());
        }
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(&bytes);
        Ok(Some(key))
    }

    async fn write_key(&self, group_id: &str, key: &[u8; KEY_SIZE]) -> Result<()> {
        // Index first, so a crash never leaves a key the wipe cannot find.
        self.add_to_index(group_id).await?;
        self.store.set(&keys::group_key(group_id), key).await?;
        Ok(())
    }

    async fn add_to_index(&self, group_id: &str) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut ids = load_index(self.store.as_ref()).await?;
        if ids.iter().any(|id| id == group_id) {
            return Ok(());
        }
        ids.push(group_id.to_string());

        let json = serde_json::to_vec(&ids).map_err(|e| StorageError::Backend(e.to_string()))?;
        self.store.set(keys::GROUP_KEY_INDEX, &json).await?;
        Ok(())
    }
}

/// Read the persisted list of group ids that have keys
pub(crate) async fn load_index(
    store: &dyn KeyValueStore,
) -> std::result::Result<Vec<String>, StorageError> {
    match store.get(keys::GROUP_KEY_INDEX).await? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::corrupted(keys::GROUP_KEY_INDEX, e.to_string())),
        None => Ok(Vec::new()),
    }
}

fn validate_group_id(group_id: &str) -> Result<()> {
    if group_id.is_empty() || group_id.chars().any(char::is_control) {
        return Err(GroupKeyError::InvalidGroupId);
    }
    Ok(())
}

fn short_id(group_id: &str) -> String {
    group_id.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn new_store() -> GroupKeyStore {
        GroupKeyStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let groups = new_store();

        let first = groups.get_or_create_group_key("clan-1").await.unwrap();
        let second = groups.get_or_create_group_key("clan-1").await.unwrap();
        let other = groups.get_or_create_group_key("clan-2").await.unwrap();

        assert_eq!(*first, *second);
        assert_ne!(*first, *other);
        assert_eq!(groups.group_ids().await.unwrap(), vec!["clan-1", "clan-2"]);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_yields_one_key() {
        let groups = Arc::new(new_store());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let groups = groups.clone();
                tokio::spawn(async move { groups.get_or_create_group_key("fresh").await })
            })
            .collect();

        let mut keys_seen = Vec::new();
        for task in tasks {
            keys_seen.push(*task.await.unwrap().unwrap());
        }
        assert!(keys_seen.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(groups.group_ids().await.unwrap(), vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_encrypt_decrypt() {
        let groups = new_store();

        let sealed = groups.encrypt("clan", b"meet at dawn").await.unwrap();
        assert_eq!(groups.decrypt("clan", &sealed).await.unwrap(), b"meet at dawn");

        let again = groups.encrypt("clan", b"meet at dawn").await.unwrap();
        assert_ne!(sealed, again);
    }

    #[tokio::test]
    async fn test_rotation_orphans_old_messages() {
        let groups = new_store();

        let sealed = groups.encrypt("clan", b"history").await.unwrap();
        let old = groups.get_or_create_group_key("clan").await.unwrap();
        let new = groups.regenerate_group_key("clan").await.unwrap();

        assert_ne!(*old, *new);
        assert!(matches!(
            groups.decrypt("clan", &sealed).await,
            Err(GroupKeyError::DecryptionError)
        ));
    }

    #[tokio::test]
    async fn test_decrypt_errors() {
        let groups = new_store();

        assert!(matches!(
            groups.decrypt("nobody", "AAAA").await,
            Err(GroupKeyError::UnknownGroup(_))
        ));
        assert!(!groups.has_group_key("nobody").await.unwrap());

        groups.get_or_create_group_key("clan").await.unwrap();
        assert!(matches!(
            groups.decrypt("clan", "%%% not base64").await,
            Err(GroupKeyError::DecryptionError)
        ));
        assert!(matches!(
            groups.decrypt("clan", "AAAA").await,
            Err(GroupKeyError::DecryptionError)
        ));
    }

    #[tokio::test]
    async fn test_cross_group_isolation() {
        let groups = new_store();

        let sealed = groups.encrypt("a", b"secret").await.unwrap();
        groups.get_or_create_group_key("b").await.unwrap();

        assert!(groups.decrypt("b", &sealed).await.is_err());
    }

    #[tokio::test]
    async fn test_idle_group_locks_are_pruned() {
        let groups = Arc::new(new_store());

        for i in 0..50 {
            let id = format!("clan-{}", i);
            groups.get_or_create_group_key(&id).await.unwrap();
            groups.regenerate_group_key(&id).await.unwrap();
        }
        assert_eq!(groups.tracked_locks().await, 0);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let groups = groups.clone();
                tokio::spawn(async move { groups.get_or_create_group_key("busy").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(groups.tracked_locks().await, 0);
        assert_eq!(groups.group_ids().await.unwrap().len(), 51);
    }

    #[tokio::test]
    async fn test_rejects_empty_group_id() {
        let groups = new_store();
        assert!(matches!(
            groups.get_or_create_group_key("").await,
            Err(GroupKeyError::InvalidGroupId)
        ));
    }
}
