//! `TotemVault`: one handle wiring every component to a single store.
//!
//! The host picks a `KeyValueStore` backend once at startup and builds a
//! vault around it. Nothing here is global; two vaults over two stores are
//! fully independent.

use std::sync::Arc;

use crate::backup::{BackupPackage, BackupService};
use crate::clock::{Clock, SystemClock};
use crate::config::TotemConfig;
use crate::credential::CredentialManager;
use crate::error::{Result, TotemError};
use crate::group_keys::GroupKeyStore;
use crate::identity_store::IdentityStore;
use crate::self_destruct::{SelfDestructGuard, WipeReport};
use crate::storage::KeyValueStore;
use totem_protocol::crypto::{self, Identity};

pub struct TotemVault {
    config: TotemConfig,
    identities: Arc<IdentityStore>,
    guard: Arc<SelfDestructGuard>,
    credentials: Arc<CredentialManager>,
    group_keys: GroupKeyStore,
    backups: BackupService,
}

impl TotemVault {
    pub fn new(store: Arc<dyn KeyValueStore>, config: TotemConfig) -> Result<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn KeyValueStore>,
        config: TotemConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let identities = Arc::new(IdentityStore::new(store.clone()));
        let guard = Arc::new(SelfDestructGuard::new(
            store.clone(),
            config.self_destruct.clone(),
        ));
        let credentials = Arc::new(CredentialManager::new(
            store.clone(),
            guard.clone(),
            clock,
            config.credential.clone(),
        ));
        let group_keys = GroupKeyStore::new(store);
        let backups = BackupService::new(
            credentials.clone(),
            identities.clone(),
            config.backup.layout(),
        );

        Ok(Self {
            config,
            identities,
            guard,
            credentials,
            group_keys,
            backups,
        })
    }

    /// Generate and persist a fresh identity
    ///
    /// Any previous credential and failure count belong to the old
    /// identity and are erased; a new PIN must be set afterwards.
    pub async fn create_identity(&self) -> Result<Identity> {
        let identity = crypto::generate_identity()?;
        self.replace_identity(&identity).await?;
        log::info!("Created identity {}", identity.symbolic_name);
        Ok(identity)
    }

    /// Rebuild the identity from its recovery phrase and persist it
    pub async fn restore_identity(&self, phrase: &str) -> Result<Identity> {
        let identity = crypto::restore_identity(phrase)?;
        self.replace_identity(&identity).await?;
        log::info!("Restored identity {}", identity.symbolic_name);
        Ok(identity)
    }

    async fn replace_identity(&self, identity: &Identity) -> Result<()> {
        self.credentials.clear().await?;
        self.guard.reset_failures().await?;
        self.identities.save(identity).await
    }

    pub async fn identity(&self) -> Result<Option<Identity>> {
        self.identities.load().await
    }

    async fn require_identity(&self) -> Result<Identity> {
        self.identities.load().await?.ok_or(TotemError::NoIdentity)
    }

    pub async fn set_pin(&self, pin: &str) -> Result<()> {
        self.require_identity().await?;
        Ok(self.credentials.create_credential(pin).await?)
    }

    /// Verify the PIN; see `CredentialManager::verify_credential`
    pub async fn unlock(&self, pin: &str) -> Result<bool> {
        Ok(self.credentials.verify_credential(pin).await?)
    }

    /// Sign `message` with the stored identity key
    pub async fn sign(&self, message: &[u8]) -> Result<String> {
        let identity = self.require_identity().await?;
        Ok(crypto::sign(message, &identity.private_key)?)
    }

    pub async fn export_backup(&self) -> Result<BackupPackage> {
        let identity = self.require_identity().await?;
        self.backups.export_backup(&identity).await
    }

    pub async fn import_backup(&self, package: &BackupPackage, pin: &str) -> Result<Identity> {
        self.backups.import_backup(package, pin).await
    }

    /// Erase every secret without waiting for the failure threshold
    pub async fn reset(&self) -> WipeReport {
        log::warn!("Vault reset requested");
        self.guard.wipe().await
    }

    pub fn config(&self) -> &TotemConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn group_keys(&self) -> &GroupKeyStore {
        &self.group_keys
    }

    pub fn self_destruct(&self) -> &SelfDestructGuard {
        &self.guard
    }

    pub fn backups(&self) -> &BackupService {
        &self.backups
    }
}
