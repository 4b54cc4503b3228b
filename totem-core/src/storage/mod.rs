//! Key-value storage contract and backends.
//!
//! The core never touches disk or platform keystores directly. Every
//! component receives an `Arc<dyn KeyValueStore>` chosen once at startup:
//!
//! 1. **MemoryStore:** process-local map, for tests and hosts that persist elsewhere.
//! 2. **FileStore:** one file per record under a directory, atomic replace on write.
//!
//! Backends are assumed to provide at-rest confidentiality (platform
//! keystore, SQLCipher, encrypted app container). The core treats them as
//! an opaque durable map.

use async_trait::async_trait;
use thiserror::Error;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Corrupted record '{key}': {reason}")]
    Corrupted { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub(crate) fn corrupted(key: &str, reason: impl Into<String>) -> Self {
        StorageError::Corrupted {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store contract (host implements, or use a bundled backend)
// ---------------------------------------------------------------------------

/// Async opaque map keyed by fixed string identifiers.
///
/// `delete` of a missing key is not an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Record names
// ---------------------------------------------------------------------------

/// Fixed record names used by the core.
pub mod keys {
    pub const IDENTITY: &str = "totem.identity";

    pub const CREDENTIAL_PIN_HASH: &str = "totem.credential.pin_hash";
    pub const CREDENTIAL_SALT: &str = "totem.credential.salt";
    pub const CREDENTIAL_DERIVED_KEY: &str = "totem.credential.derived_key";
    pub const CREDENTIAL_ATTEMPTS: &str = "totem.credential.attempts";
    pub const CREDENTIAL_LOCKED_UNTIL: &str = "totem.credential.locked_until";

    /// Every credential record, in wipe order
    pub const CREDENTIAL_RECORDS: [&str; 5] = [
        CREDENTIAL_PIN_HASH,
        CREDENTIAL_SALT,
        CREDENTIAL_DERIVED_KEY,
        CREDENTIAL_ATTEMPTS,
        CREDENTIAL_LOCKED_UNTIL,
    ];

    pub const SELF_DESTRUCT_FAILURES: &str = "totem.self_destruct.failures";

    pub const GROUP_KEY_INDEX: &str = "totem.group_keys.index";
    pub const GROUP_KEY_PREFIX: &str = "totem.group_key.";

    pub fn group_key(group_id: &str) -> String {
        format!("{}{}", GROUP_KEY_PREFIX, group_id)
    }
}

// ---------------------------------------------------------------------------
// Small typed helpers over raw bytes
// ---------------------------------------------------------------------------

pub(crate) async fn get_u32(store: &dyn KeyValueStore, key: &str) -> Result<u32> {
    match store.get(key).await? {
        Some(bytes) => {
            bincode::deserialize(&bytes).map_err(|e| StorageError::corrupted(key, e.to_string()))
        }
        None => Ok(0),
    }
}

pub(crate) async fn set_u32(store: &dyn KeyValueStore, key: &str, value: u32) -> Result<()> {
    let bytes = bincode::serialize(&value).map_err(|e| StorageError::Backend(e.to_string()))?;
    store.set(key, &bytes).await
}

pub(crate) async fn get_i64(store: &dyn KeyValueStore, key: &str) -> Result<Option<i64>> {
    match store.get(key).await? {
        Some(bytes) => bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| StorageError::corrupted(key, e.to_string())),
        None => Ok(None),
    }
}

pub(crate) async fn set_i64(store: &dyn KeyValueStore, key: &str, value: i64) -> Result<()> {
    let bytes = bincode::serialize(&value).map_err(|e| StorageError::Backend(e.to_string()))?;
    store.set(key, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_u32_helpers() {
        let store = MemoryStore::new();

        assert_eq!(get_u32(&store, "counter").await.unwrap(), 0);
        set_u32(&store, "counter", 7).await.unwrap();
        assert_eq!(get_u32(&store, "counter").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_i64_helpers() {
        let store = MemoryStore::new();

        assert_eq!(get_i64(&store, "ts").await.unwrap(), None);
        set_i64(&store, "ts", -42).await.unwrap();
        assert_eq!(get_i64(&store, "ts").await.unwrap(), Some(-42));
    }

    #[tokio::test]
    async fn test_corrupted_counter() {
        let store = MemoryStore::new();
        store.set("counter", &[1]).await.unwrap();

        assert!(matches!(
            get_u32(&store, "counter").await,
            Err(StorageError::Corrupted { .. })
        ));
    }

    #[test]
    fn test_group_key_names() {
        assert_eq!(keys::group_key("clan-7"), "totem.group_key.clan-7");
        assert!(keys::group_key("x").starts_with(keys::GROUP_KEY_PREFIX));
    }
}
