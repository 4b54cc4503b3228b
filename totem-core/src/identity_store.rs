use std::sync::Arc;

use crate::error::Result;
use crate::storage::{keys, KeyValueStore, StorageError};
use totem_protocol::crypto::{validate_identity, Identity, IdentityError};

/// Persists the single local identity as a JSON record
pub struct IdentityStore {
    store: Arc<dyn KeyValueStore>,
}

impl IdentityStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn save(&self, identity: &Identity) -> Result<()> {
        let json = serde_json::to_vec(identity)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        self.store.set(keys::IDENTITY, &json).await?;
        log::info!("Identity {} saved", identity.identity_id);
        Ok(())
    }

    /// Load the stored identity, rejecting records that fail the integrity check
    pub async fn load(&self) -> Result<Option<Identity>> {
        let Some(bytes) = self.store.get(keys::IDENTITY).await? else {
            return Ok(None);
        };

        let identity: Identity =
            serde_json::from_slice(&bytes).map_err(|_| IdentityError::Corrupted)?;
        if !validate_identity(&identity) {
            log::warn!("Stored identity failed its integrity check");
            return Err(IdentityError::Corrupted.into());
        }
        Ok(Some(identity))
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.store.get(keys::IDENTITY).await?.is_some())
    }

    pub async fn delete(&self) -> Result<()> {
        self.store.delete(keys::IDENTITY).await?;
        Ok(())
    }
}
