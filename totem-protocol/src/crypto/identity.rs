/// Totem Identity
///
/// A Totem is the self-sovereign identity of one installation: a secp256k1
/// keypair plus identifiers derived from it.
///
/// Derivation from 16 bytes of entropy:
/// ```text
/// private_key   = SHA-256(entropy)
/// public_key    = compressed secp256k1 point of private_key (33 bytes)
/// identity_id   = hex(SHA-256(public_key))[0..16]
/// symbolic_name = TOTEM_NAMES[int(identity_id[0..2], 16) % N] + "#" + identity_id[0..4]
/// recovery      = 12-word BIP39 encoding of the entropy
/// ```
///
/// The flat hash derivation is not BIP32 compatible. Only the mnemonic
/// encoding itself follows BIP39; restoration determinism is the contract.

use bip39::{Language, Mnemonic};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::hashing::constant_time_eq;

/// Entropy size behind a 12-word mnemonic
pub const SEED_SIZE: usize = 16;
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Compressed SEC1 point
pub const PUBLIC_KEY_SIZE: usize = 33;
pub const IDENTITY_ID_LEN: usize = 16;
pub const MNEMONIC_WORDS: usize = 12;

/// Wordlist used for the human-readable half of a symbolic name.
pub const TOTEM_NAMES: [&str; 32] = [
    "Bear", "Wolf", "Eagle", "Raven", "Fox", "Owl", "Otter", "Lynx",
    "Heron", "Bison", "Hawk", "Salmon", "Turtle", "Crane", "Badger", "Elk",
    "Falcon", "Moose", "Orca", "Beaver", "Cougar", "Coyote", "Dolphin", "Hare",
    "Lizard", "Mole", "Panther", "Seal", "Sparrow", "Stag", "Viper", "Whale",
];

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid recovery phrase")]
    InvalidMnemonic,
    #[error("Key derivation failed")]
    KeyDerivationFailed,
    #[error("Identity record is corrupted")]
    Corrupted,
}

pub type Result<T> = std::result::Result<T, IdentityError>;

/// A Totem identity.
///
/// Fields are public so that stored or imported records (which may be
/// partial or tampered) can be represented and checked with
/// [`validate_identity`]. Key material is zeroized on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// 32-byte secp256k1 secret scalar
    #[serde(with = "hex::serde")]
    pub private_key: Vec<u8>,
    /// 33-byte compressed public key
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    /// 16 lowercase hex chars
    pub identity_id: String,
    pub symbolic_name: String,
    /// 12-word mnemonic
    pub recovery_phrase: String,
}

impl Identity {
    /// Hex encoding of the compressed public key
    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("identity_id", &self.identity_id)
            .field("symbolic_name", &self.symbolic_name)
            .field("public_key", &self.public_key_hex())
            .field("private_key", &"<redacted>")
            .field("recovery_phrase", &"<redacted>")
            .finish()
    }
}

/// Generate a brand-new identity from OS entropy.
///
/// Nothing is persisted; the caller owns storage.
pub fn generate_identity() -> Result<Identity> {
    let mut entropy = [0u8; SEED_SIZE];
    OsRng.fill_bytes(&mut entropy);

    let result = identity_from_entropy(&entropy);

    entropy.zeroize();
    result
}

/// Deterministically build an identity from raw entropy.
///
/// Exposed for test vectors; normal callers use [`generate_identity`].
pub fn identity_from_entropy(entropy: &[u8; SEED_SIZE]) -> Result<Identity> {
    let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy)
        .map_err(|_| IdentityError::InvalidMnemonic)?;

    derive_identity(entropy, mnemonic.to_string())
}

/// Restore an identity from its 12-word recovery phrase.
///
/// Words are matched case-insensitively and extra whitespace is ignored.
/// The returned `recovery_phrase` is the normalized form (lowercase,
/// single spaces), not the caller's input verbatim: `"Abandon  ABOUT"`
/// comes back as `"abandon about"`. Compare phrases after normalizing.
///
/// # Errors
/// `InvalidMnemonic` for unknown words, wrong word count or a bad checksum.
pub fn restore_identity(phrase: &str) -> Result<Identity> {
    let normalized = normalize_phrase(phrase);

    let mnemonic = Mnemonic::parse_in_normalized(Language::English, &normalized)
        .map_err(|_| IdentityError::InvalidMnemonic)?;

    if mnemonic.word_count() != MNEMONIC_WORDS {
        return Err(IdentityError::InvalidMnemonic);
    }

    let mut entropy = mnemonic.to_entropy();
    let result = derive_identity(&entropy, normalized);
    entropy.zeroize();

    result
}

/// Check that an identity's derived fields match its private key.
///
/// Recomputes the public key from the private key and the identity id
/// from the public key. Missing (empty) or malformed fields yield `false`.
pub fn validate_identity(identity: &Identity) -> bool {
    if identity.private_key.len() != PRIVATE_KEY_SIZE
        || identity.public_key.len() != PUBLIC_KEY_SIZE
        || identity.identity_id.is_empty()
    {
        return false;
    }

    let expected_public = match public_key_from_private(&identity.private_key) {
        Ok(pk) => pk,
        Err(_) => return false,
    };

    if !constant_time_eq(&expected_public, &identity.public_key) {
        return false;
    }

    identity_id_from_public_key(&identity.public_key) == identity.identity_id
}

/// Compressed secp256k1 public key for a 32-byte private key
pub fn public_key_from_private(private_key: &[u8]) -> Result<[u8; PUBLIC_KEY_SIZE]> {
    if private_key.len() != PRIVATE_KEY_SIZE {
        return Err(IdentityError::KeyDerivationFailed);
    }

    let secret =
        SecretKey::from_slice(private_key).map_err(|_| IdentityError::KeyDerivationFailed)?;
    let point = secret.public_key().to_encoded_point(true);

    let mut public_key = [0u8; PUBLIC_KEY_SIZE];
    public_key.copy_from_slice(point.as_bytes());
    Ok(public_key)
}

/// First 16 hex chars of SHA-256(public_key)
pub fn identity_id_from_public_key(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    let mut id = hex::encode(digest);
    id.truncate(IDENTITY_ID_LEN);
    id
}

/// Human-readable name such as `Otter#a7f3`
pub fn symbolic_name(identity_id: &str) -> String {
    let prefix = identity_id.get(0..4).unwrap_or(identity_id);
    let selector = identity_id
        .get(0..2)
        .and_then(|byte| u8::from_str_radix(byte, 16).ok())
        .unwrap_or(0);

    format!(
        "{}#{}",
        TOTEM_NAMES[selector as usize % TOTEM_NAMES.len()],
        prefix
    )
}

fn derive_identity(entropy: &[u8], recovery_phrase: String) -> Result<Identity> {
    let private_key: [u8; PRIVATE_KEY_SIZE] = Sha256::digest(entropy).into();
    let public_key = public_key_from_private(&private_key)?;
    let identity_id = identity_id_from_public_key(&public_key);
    let symbolic_name = symbolic_name(&identity_id);

    Ok(Identity {
        private_key: private_key.to_vec(),
        public_key: public_key.to_vec(),
        identity_id,
        symbolic_name,
        recovery_phrase,
    })
}

fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
