use thiserror::Error;

use crate::config::ConfigError;
use crate::credential::CredentialError;
use crate::group_keys::GroupKeyError;
use crate::self_destruct::SelfDestructError;
use crate::storage::StorageError;
use totem_protocol::backup::BackupError;
use totem_protocol::crypto::{IdentityError, SigningError};

/// Top-level error returned by the vault facade
#[derive(Error, Debug)]
pub enum TotemError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    SelfDestruct(#[from] SelfDestructError),
    #[error(transparent)]
    GroupKey(#[from] GroupKeyError),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("No identity has been created or restored")]
    NoIdentity,
}

pub type Result<T> = std::result::Result<T, TotemError>;

impl TotemError {
    /// True when this error means the device has just been wiped
    pub fn is_self_destruct(&self) -> bool {
        matches!(
            self,
            TotemError::Credential(CredentialError::SelfDestructTriggered)
        )
    }
}
