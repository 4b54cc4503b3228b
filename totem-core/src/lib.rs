//! # Totem Core
//!
//! Stateful half of the Totem subsystem: a PIN credential with lockout, a
//! self-destruct tripwire, per-group message keys, identity persistence and
//! backup import/export, all over an injected [`storage::KeyValueStore`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use totem_core::{storage::MemoryStore, TotemConfig, TotemVault};
//!
//! # async fn demo() -> totem_core::Result<()> {
//! let vault = TotemVault::new(Arc::new(MemoryStore::new()), TotemConfig::default())?;
//! let identity = vault.create_identity().await?;
//! vault.set_pin("482916").await?;
//!
//! let sealed = vault.group_keys().encrypt("clan-7", b"hello").await?;
//! let package = vault.export_backup().await?;
//! # let _ = (identity, sealed, package);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::doc_lazy_continuation, clippy::empty_line_after_doc_comments)]

// ── Re-export protocol modules ──────────────────────────────────────────────
pub use totem_protocol::crypto;

// ── Local modules ───────────────────────────────────────────────────────────
pub mod backup;
pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod group_keys;
pub mod identity_store;
pub mod self_destruct;
pub mod storage;
pub mod vault;

// ── Re-export main types ────────────────────────────────────────────────────
pub use backup::{BackupError, BackupPackage, BackupService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TotemConfig;
pub use credential::{CredentialError, CredentialManager, LockStatus};
pub use crypto::{Identity, IdentityError};
pub use error::{Result, TotemError};
pub use group_keys::{GroupKeyError, GroupKeyStore};
pub use identity_store::IdentityStore;
pub use self_destruct::{FailureOutcome, SelfDestructGuard, WipeReport};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use vault::TotemVault;

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version
pub fn get_version() -> &'static str {
    VERSION
}
