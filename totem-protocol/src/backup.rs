/// Encrypted Identity Backup Format
///
/// An identity is serialized to JSON, encrypted with the PIN-derived key
/// (XChaCha20-Poly1305) and base64-encoded. The SHA-256 of that base64 string
/// is the package checksum.
///
/// Payloads longer than the chunk threshold are split into ordered chunks
/// so they fit in a sequence of QR codes.
///
/// Wire forms:
/// ```text
/// file:  {"encrypted": "<base64>", "checksum": "<hex>", "version": "1.0"}
/// qr:    {"type": "single", "data": "<base64>", "checksum": "<hex>"}
///        {"type": "multi", "chunks": [{"index", "total", "data"}], "checksum": "<hex>"}
/// ```
///
/// Chunk indices are zero-based; `total` is the number of chunks.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::encryption;
use crate::crypto::hashing::{constant_time_eq, sha256_hex};
use crate::crypto::identity::{self, Identity};

pub const BACKUP_VERSION: &str = "1.0";
/// Payloads longer than this (in chars) are chunked
pub const DEFAULT_CHUNK_THRESHOLD: usize = 2000;
pub const DEFAULT_CHUNK_SIZE: usize = 1500;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Backup checksum mismatch")]
    ChecksumMismatch,
    #[error("Malformed backup package: {0}")]
    MalformedPackage(String),
    #[error("Backup identity does not match its recovery phrase")]
    IdentityMismatch,
    #[error("Backup chunks are incomplete or corrupt")]
    IncompleteOrCorrupt,
    #[error("Incorrect credential")]
    IncorrectCredential,
    #[error("Unsupported backup version: {0}")]
    UnsupportedVersion(String),
    #[error("Invalid chunk layout: threshold {threshold}, chunk size {chunk_size}")]
    InvalidLayout { threshold: usize, chunk_size: usize },
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
}

pub type Result<T> = std::result::Result<T, BackupError>;

/// One QR-sized fragment of an encrypted payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupChunk {
    pub index: usize,
    pub total: usize,
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackupPayload {
    Single(String),
    Chunked(Vec<BackupChunk>),
}

/// Transient backup artifact handed to storage or sharing layers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupPackage {
    pub payload: BackupPayload,
    /// Lowercase hex SHA-256 of the full base64 payload
    pub checksum: String,
    pub version: String,
}

/// When and how to split payloads
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkLayout {
    pub threshold: usize,
    pub chunk_size: usize,
}

impl Default for ChunkLayout {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CHUNK_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ChunkLayout {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > self.threshold {
            return Err(BackupError::InvalidLayout {
                threshold: self.threshold,
                chunk_size: self.chunk_size,
            });
        }
        Ok(())
    }
}

/// Single-file backup form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    pub encrypted: String,
    pub checksum: String,
    pub version: String,
}

/// QR transport form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QrPackage {
    Single {
        data: String,
        checksum: String,
    },
    Multi {
        chunks: Vec<BackupChunk>,
        checksum: String,
    },
}

impl BackupFile {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| BackupError::MalformedPackage(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BackupError::MalformedPackage(e.to_string()))
    }
}

impl QrPackage {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| BackupError::MalformedPackage(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BackupError::MalformedPackage(e.to_string()))
    }
}

impl BackupPackage {
    /// Number of QR codes needed to carry this package
    pub fn chunk_count(&self) -> usize {
        match &self.payload {
            BackupPayload::Single(_) => 1,
            BackupPayload::Chunked(chunks) => chunks.len(),
        }
    }

    /// Structurally re-join the payload without checking the checksum
    ///
    /// Chunks are ordered by `index`; gaps, duplicates or disagreeing
    /// `total` values are `IncompleteOrCorrupt`.
    pub fn joined_payload(&self) -> Result<String> {
        match &self.payload {
            BackupPayload::Single(data) => Ok(data.clone()),
            BackupPayload::Chunked(chunks) => join_chunks(chunks),
        }
    }

    /// Convert to the single-file form, re-joining chunks if needed
    pub fn to_file(&self) -> Result<BackupFile> {
        Ok(BackupFile {
            encrypted: self.joined_payload()?,
            checksum: self.checksum.clone(),
            version: self.version.clone(),
        })
    }

    pub fn from_file(file: BackupFile) -> Result<Self> {
        if file.version != BACKUP_VERSION {
            return Err(BackupError::UnsupportedVersion(file.version));
        }
        Ok(Self {
            payload: BackupPayload::Single(file.encrypted),
            checksum: file.checksum,
            version: file.version,
        })
    }

    pub fn to_qr(&self) -> QrPackage {
        match &self.payload {
            BackupPayload::Single(data) => QrPackage::Single {
                data: data.clone(),
                checksum: self.checksum.clone(),
            },
            BackupPayload::Chunked(chunks) => QrPackage::Multi {
                chunks: chunks.clone(),
                checksum: self.checksum.clone(),
            },
        }
    }

    /// QR packages carry no version; they are always the current format.
    pub fn from_qr(qr: QrPackage) -> Self {
        let (payload, checksum) = match qr {
            QrPackage::Single { data, checksum } => (BackupPayload::Single(data), checksum),
            QrPackage::Multi { chunks, checksum } => (BackupPayload::Chunked(chunks), checksum),
        };
        Self {
            payload,
            checksum,
            version: BACKUP_VERSION.to_string(),
        }
    }
}

/// Checksum of a base64 payload
pub fn checksum(encrypted_payload: &str) -> String {
    sha256_hex(encrypted_payload.as_bytes())
}

/// Encrypt an identity into a backup package
///
/// # Arguments
/// * `identity` - Identity to back up
/// * `derived_key` - 32-byte key from the PIN credential
/// * `layout` - Chunking threshold and chunk size
pub fn export_backup(
    identity: &Identity,
    derived_key: &[u8],
    layout: ChunkLayout,
) -> Result<BackupPackage> {
    layout.validate()?;

    let mut serialized =
        serde_json::to_vec(identity).map_err(|e| BackupError::MalformedPackage(e.to_string()))?;
    let sealed = encryption::encrypt_message(&serialized, derived_key)
        .map_err(|_| BackupError::EncryptionFailed);
    serialized.zeroize();

    let encrypted = STANDARD.encode(sealed?);
    let checksum = checksum(&encrypted);

    let payload = if encrypted.chars().count() > layout.threshold {
        let chunks = split_into_chunks(&encrypted, layout.chunk_size);
        log::debug!("Backup payload split into {} chunks", chunks.len());
        BackupPayload::Chunked(chunks)
    } else {
        BackupPayload::Single(encrypted)
    };

    Ok(BackupPackage {
        payload,
        checksum,
        version: BACKUP_VERSION.to_string(),
    })
}

/// Verify, decrypt and authenticate a backup package
///
/// Steps: version check, structural re-join, checksum comparison,
/// decryption, parsing, and finally re-deriving the identity from its
/// embedded recovery phrase. The decrypted record must equal the
/// re-derived identity exactly, which rejects payloads that pass the
/// checksum but were semantically altered.
pub fn open_backup(package: &BackupPackage, derived_key: &[u8]) -> Result<Identity> {
    if package.version != BACKUP_VERSION {
        return Err(BackupError::UnsupportedVersion(package.version.clone()));
    }

    let encrypted = package.joined_payload()?;
    if !checksum_matches(&encrypted, &package.checksum) {
        return Err(BackupError::ChecksumMismatch);
    }

    let sealed = STANDARD
        .decode(encrypted.as_bytes())
        .map_err(|e| BackupError::MalformedPackage(e.to_string()))?;
    let mut plaintext = encryption::decrypt_message(&sealed, derived_key)
        .map_err(|_| BackupError::DecryptionFailed)?;

    let parsed = serde_json::from_slice::<Identity>(&plaintext);
    plaintext.zeroize();
    let candidate = parsed.map_err(|e| BackupError::MalformedPackage(e.to_string()))?;

    let rederived = identity::restore_identity(&candidate.recovery_phrase)
        .map_err(|_| BackupError::IdentityMismatch)?;

    let keys_match = constant_time_eq(&rederived.private_key, &candidate.private_key)
        && constant_time_eq(&rederived.public_key, &candidate.public_key);
    if !keys_match || rederived != candidate {
        log::warn!("Backup rejected: decrypted identity does not match its recovery phrase");
        return Err(BackupError::IdentityMismatch);
    }

    Ok(rederived)
}

/// Split a payload into ordered chunks of at most `chunk_size` chars
pub fn split_into_chunks(payload: &str, chunk_size: usize) -> Vec<BackupChunk> {
    let chars: Vec<char> = payload.chars().collect();
    let size = chunk_size.max(1);
    let total = chars.len().div_ceil(size).max(1);

    if chars.is_empty() {
        return vec![BackupChunk {
            index: 0,
            total,
            data: String::new(),
        }];
    }

    chars
        .chunks(size)
        .enumerate()
        .map(|(index, part)| BackupChunk {
            index,
            total,
            data: part.iter().collect(),
        })
        .collect()
}

/// Rebuild a chunked payload and validate it against `checksum`
///
/// Input order is not trusted: chunks are sorted by `index` first.
///
/// # Errors
/// `IncompleteOrCorrupt` for missing/duplicate chunks, inconsistent totals,
/// or a checksum mismatch.
pub fn reassemble_chunks(chunks: &[BackupChunk], checksum: &str) -> Result<String> {
    let payload = join_chunks(chunks)?;

    if !checksum_matches(&payload, checksum) {
        log::warn!("Chunk reassembly failed checksum validation");
        return Err(BackupError::IncompleteOrCorrupt);
    }

    Ok(payload)
}

fn join_chunks(chunks: &[BackupChunk]) -> Result<String> {
    let total = chunks.first().map(|c| c.total).ok_or(BackupError::IncompleteOrCorrupt)?;

    if total == 0 || chunks.len() != total || chunks.iter().any(|c| c.total != total) {
        return Err(BackupError::IncompleteOrCorrupt);
    }

    let mut ordered: Vec<&BackupChunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.index);

    if ordered.iter().enumerate().any(|(expected, c)| c.index != expected) {
        return Err(BackupError::IncompleteOrCorrupt);
    }

    Ok(ordered.iter().map(|c| c.data.as_str()).collect())
}

fn checksum_matches(payload: &str, expected: &str) -> bool {
    let actual = checksum(payload);
    constant_time_eq(actual.as_bytes(), expected.to_ascii_lowercase().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encryption::generate_key;
    use crate::crypto::identity::generate_identity;

    fn small_layout() -> ChunkLayout {
        ChunkLayout {
            threshold: 200,
            chunk_size: 150,
        }
    }

    #[test]
    fn test_export_open_roundtrip() {
        let identity = generate_identity().unwrap();
        let key = generate_key();

        let package = export_backup(&identity, &key, ChunkLayout::default()).unwrap();
        assert_eq!(package.version, BACKUP_VERSION);
        assert!(matches!(package.payload, BackupPayload::Single(_)));

        let restored = open_backup(&package, &key).unwrap();
        assert_eq!(restored, identity);
    }

    #[test]
    fn test_checksum_covers_payload() {
        let identity = generate_identity().unwrap();
        let key = generate_key();
        let package = export_backup(&identity, &key, ChunkLayout::default()).unwrap();

        let payload = package.joined_payload().unwrap();
        assert_eq!(package.checksum, checksum(&payload));
        assert_eq!(package.checksum.len(), 64);
    }

    #[test]
    fn test_flipped_checksum_is_rejected() {
        let identity = generate_identity().unwrap();
        let key = generate_key();
        let mut package = export_backup(&identity, &key, ChunkLayout::default()).unwrap();

        let mut bytes = hex::decode(&package.checksum).unwrap();
        bytes[0] ^= 0x01;
        package.checksum = hex::encode(bytes);

        assert!(matches!(
            open_backup(&package, &key),
            Err(BackupError::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_flipped_payload_is_rejected() {
        let identity = generate_identity().unwrap();
        let key = generate_key();
        let mut package = export_backup(&identity, &key, ChunkLayout::default()).unwrap();

        if let BackupPayload::Single(data) = &mut package.payload {
            let mut raw = STANDARD.decode(data.as_bytes()).unwrap();
            raw[30] ^= 0x80;
            *data = STANDARD.encode(raw);
        }

        assert!(matches!(
            open_backup(&package, &key),
            Err(BackupError::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_wrong_key_fails_decryption() {
        let identity = generate_identity().unwrap();
        let package = export_backup(&identity, &generate_key(), ChunkLayout::default()).unwrap();

        assert!(matches!(
            open_backup(&package, &generate_key()),
            Err(BackupError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_semantically_altered_payload_is_rejected() {
        // A re-encrypted record with a valid checksum but a foreign key pair
        let identity = generate_identity().unwrap();
        let intruder = generate_identity().unwrap();
        let key = generate_key();

        let mut forged = identity.clone();
        forged.private_key = intruder.private_key.clone();
        forged.public_key = intruder.public_key.clone();
        forged.identity_id = intruder.identity_id.clone();

        let package = export_backup(&forged, &key, ChunkLayout::default()).unwrap();
        assert!(matches!(
            open_backup(&package, &key),
            Err(BackupError::IdentityMismatch)
        ));

        let mut renamed = identity.clone();
        renamed.symbolic_name = "Impostor#0000".to_string();
        let package = export_backup(&renamed, &key, ChunkLayout::default()).unwrap();
        assert!(matches!(
            open_backup(&package, &key),
            Err(BackupError::IdentityMismatch)
        ));
    }

    #[test]
    fn test_large_payload_is_chunked() {
        let identity = generate_identity().unwrap();
        let key = generate_key();
        let layout = small_layout();

        let package = export_backup(&identity, &key, layout).unwrap();
        let payload = package.joined_payload().unwrap();
        assert!(payload.len() > layout.threshold);

        match &package.payload {
            BackupPayload::Chunked(chunks) => {
                let expected = payload.len().div_ceil(layout.chunk_size);
                assert_eq!(chunks.len(), expected);
                assert!(chunks.iter().all(|c| c.total == chunks.len()));
                assert!(chunks.iter().all(|c| c.data.len() <= layout.chunk_size));
            }
            BackupPayload::Single(_) => panic!("expected chunked payload"),
        }

        assert_eq!(open_backup(&package, &key).unwrap(), identity);
    }

    #[test]
    fn test_reassemble_out_of_order() {
        let payload = "A".repeat(1500) + &"B".repeat(1500) + "C";
        let sum = checksum(&payload);

        let mut chunks = split_into_chunks(&payload, DEFAULT_CHUNK_SIZE);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.total == 3));

        chunks.reverse();
        chunks.swap(0, 1);
        assert_eq!(reassemble_chunks(&chunks, &sum).unwrap(), payload);
    }

    #[test]
    fn test_reassemble_detects_corruption() {
        let payload = "x".repeat(4000);
        let sum = checksum(&payload);
        let mut chunks = split_into_chunks(&payload, DEFAULT_CHUNK_SIZE);

        chunks[1].data.replace_range(0..1, "y");
        assert!(matches!(
            reassemble_chunks(&chunks, &sum),
            Err(BackupError::IncompleteOrCorrupt)
        ));
    }

    #[test]
    fn test_reassemble_detects_missing_and_duplicate_chunks() {
        let payload = "z".repeat(3200);
        let sum = checksum(&payload);
        let chunks = split_into_chunks(&payload, DEFAULT_CHUNK_SIZE);

        let missing = vec![chunks[0].clone(), chunks[2].clone()];
        assert!(reassemble_chunks(&missing, &sum).is_err());

        let duplicated = vec![chunks[0].clone(), chunks[0].clone(), chunks[2].clone()];
        assert!(matches!(
            reassemble_chunks(&duplicated, &sum),
            Err(BackupError::IncompleteOrCorrupt)
        ));

        assert!(reassemble_chunks(&[], &sum).is_err());
    }

    #[test]
    fn test_chunk_boundaries() {
        assert_eq!(split_into_chunks("abc", 3).len(), 1);
        assert_eq!(split_into_chunks("abcd", 3).len(), 2);
        let empty = split_into_chunks("", 3);
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].total, 1);
    }

    #[test]
    fn test_file_format() {
        let identity = generate_identity().unwrap();
        let key = generate_key();
        let package = export_backup(&identity, &key, small_layout()).unwrap();

        let json = package.to_file().unwrap().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], "1.0");
        assert!(value["encrypted"].is_string());
        assert_eq!(value["checksum"], package.checksum.as_str());

        let parsed = BackupPackage::from_file(BackupFile::from_json(&json).unwrap()).unwrap();
        assert_eq!(open_backup(&parsed, &key).unwrap(), identity);
    }

    #[test]
    fn test_file_rejects_unknown_version() {
        let file = BackupFile {
            encrypted: "AAAA".to_string(),
            checksum: checksum("AAAA"),
            version: "2.0".to_string(),
        };
        assert!(matches!(
            BackupPackage::from_file(file),
            Err(BackupError::UnsupportedVersion(v)) if v == "2.0"
        ));
    }

    #[test]
    fn test_qr_format() {
        let identity = generate_identity().unwrap();
        let key = generate_key();

        let single = export_backup(&identity, &key, ChunkLayout::default()).unwrap();
        let json = single.to_qr().to_json().unwrap();
        assert!(json.contains("\"type\":\"single\""));

        let multi = export_backup(&identity, &key, small_layout()).unwrap();
        let json = multi.to_qr().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "multi");
        assert_eq!(value["chunks"][0]["index"], 0);

        let parsed = BackupPackage::from_qr(QrPackage::from_json(&json).unwrap());
        assert_eq!(parsed, multi);
        assert_eq!(open_backup(&parsed, &key).unwrap(), identity);
    }

    #[test]
    fn test_qr_rejects_garbage() {
        assert!(matches!(
            QrPackage::from_json("{\"type\":\"triple\"}"),
            Err(BackupError::MalformedPackage(_))
        ));
    }

    #[test]
    fn test_invalid_layout() {
        let identity = generate_identity().unwrap();
        let layout = ChunkLayout {
            threshold: 100,
            chunk_size: 150,
        };
        assert!(matches!(
            export_backup(&identity, &generate_key(), layout),
            Err(BackupError::InvalidLayout { .. })
        ));
    }
}
