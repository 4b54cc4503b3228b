use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;

use super::{KeyValueStore, Result, StorageError};
use totem_protocol::crypto::sha256_hex;

/// Directory-backed store: one file per record.
///
/// Files are named by the SHA-256 of the record name, so arbitrary group
/// ids of any length map to a fixed-size name inside the root directory.
/// Each write lands in its own uniquely named temp file that is renamed
/// over the target, so a crash leaves either the old or the new record,
/// never a torn one, and concurrent writers never share a staging file.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        log::debug!("FileStore opened at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.rec", sha256_hex(key.as_bytes())))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.record_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let root = self.root.clone();
        let target = self.record_path(key);
        let value = value.to_vec();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut staging = NamedTempFile::new_in(&root)?;
            staging.write_all(&value)?;
            staging.as_file().sync_all()?;
            staging.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.record_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
