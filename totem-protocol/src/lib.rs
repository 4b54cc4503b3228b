//! # Totem Protocol
//!
//! **Self-sovereign identities and message keys for peer-group chat.**
//!
//! This crate holds the stateless half of the Totem subsystem: every
//! function here is a pure transformation over bytes and records. The
//! stateful managers that persist credentials and keys live in `totem-core`.
//!
//! ## Quick Start
//!
//! ```rust
//! use totem_protocol::crypto::{generate_identity, restore_identity, sign, verify};
//!
//! let identity = generate_identity().expect("identity");
//! let restored = restore_identity(&identity.recovery_phrase).expect("restore");
//! assert_eq!(restored.identity_id, identity.identity_id);
//!
//! let signature = sign(b"hello", &identity.private_key).expect("sign");
//! assert!(verify(b"hello", &signature, &identity.public_key_hex()));
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`crypto`] | Identity derivation, signing, PIN key derivation, group encryption |
//! | [`backup`] | Encrypted backup packages, file/QR wire forms, chunk reassembly |

#![allow(clippy::doc_lazy_continuation, clippy::empty_line_after_doc_comments)]

// ── Public modules ──────────────────────────────────────────────────────────

/// Identity, signatures, PIN derivation and authenticated encryption.
pub mod crypto;

/// Backup packages and their wire formats.
pub mod backup;

// ── Re-exports for convenience ──────────────────────────────────────────────

pub use backup::{
    export_backup, open_backup, reassemble_chunks, BackupChunk, BackupError, BackupFile,
    BackupPackage, BackupPayload, ChunkLayout, QrPackage,
};
pub use crypto::{
    generate_identity, restore_identity, sign, validate_identity, verify, Identity, IdentityError,
};

// ── Library metadata ────────────────────────────────────────────────────────

/// Totem Protocol version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the protocol crate version string.
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
        assert!(version().contains('.'));
    }

    #[test]
    fn test_backup_roundtrip_through_reexports() {
        let identity = generate_identity().expect("identity");
        let key = crypto::generate_key();

        let package = export_backup(&identity, &key, ChunkLayout::default()).expect("export");
        let restored = open_backup(&package, &key).expect("open");
        assert!(validate_identity(&restored));
        assert_eq!(restored.identity_id, identity.identity_id);
    }
}
