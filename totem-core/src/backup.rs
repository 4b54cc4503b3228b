/// Backup export/import bound to the local credential.
///
/// The wire formats and the encrypt/verify pipeline live in
/// `totem_protocol::backup`; this module supplies the key from the
/// credential manager, gates import on the PIN, and persists the result.

use std::sync::Arc;

use crate::credential::{CredentialError, CredentialManager};
use crate::error::Result;
use crate::identity_store::IdentityStore;
pub use totem_protocol::backup::{
    checksum, open_backup, reassemble_chunks, split_into_chunks, BackupChunk, BackupError,
    BackupFile, BackupPackage, BackupPayload, ChunkLayout, QrPackage, BACKUP_VERSION,
};
use totem_protocol::crypto::Identity;

pub struct BackupService {
    credentials: Arc<CredentialManager>,
    identities: Arc<IdentityStore>,
    layout: ChunkLayout,
}

impl BackupService {
    pub fn new(
        credentials: Arc<CredentialManager>,
        identities: Arc<IdentityStore>,
        layout: ChunkLayout,
    ) -> Self {
        Self {
            credentials,
            identities,
            layout,
        }
    }

    /// Encrypt `identity` under the credential's derived key
    pub async fn export_backup(&self, identity: &Identity) -> Result<BackupPackage> {
        let key = self
            .credentials
            .get_derived_key()
            .await?
            .ok_or(CredentialError::NoCredential)?;

        let package = totem_protocol::backup::export_backup(identity, &key, self.layout)?;
        log::info!(
            "Exported backup for {} ({} part(s))",
            identity.identity_id,
            package.chunk_count()
        );
        Ok(package)
    }

    /// Verify the PIN, then authenticate, decrypt and persist the backed-up identity
    ///
    /// A wrong PIN is reported as `IncorrectCredential` and counts as a
    /// failed attempt like any other PIN check.
    pub async fn import_backup(&self, package: &BackupPackage, pin: &str) -> Result<Identity> {
        if !self.credentials.verify_credential(pin).await? {
            log::warn!("Backup import rejected: incorrect PIN");
            return Err(BackupError::IncorrectCredential.into());
        }

        let key = self
            .credentials
            .get_derived_key()
            .await?
            .ok_or(CredentialError::NoCredential)?;

        let identity = totem_protocol::backup::open_backup(package, &key).map_err(|e| {
            log::warn!("Backup import rejected: {}", e);
            e
        })?;

        self.identities.save(&identity).await?;
        log::info!("Imported backup for {}", identity.identity_id);
        Ok(identity)
    }

    /// Import from the single-file JSON form
    pub async fn import_backup_file(&self, json: &str, pin: &str) -> Result<Identity> {
        let package = BackupPackage::from_file(BackupFile::from_json(json)?)?;
        self.import_backup(&package, pin).await
    }

    /// Import from the QR JSON form (single or multi)
    pub async fn import_backup_qr(&self, json: &str, pin: &str) -> Result<Identity> {
        let package = BackupPackage::from_qr(QrPackage::from_json(json)?);
        self.import_backup(&package, pin).await
    }
}
