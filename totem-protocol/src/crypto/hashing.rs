use hkdf::Hkdf;
use hmac::Hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// PBKDF2 iterations applied to `pin || salt`
pub const DEFAULT_PIN_KDF_ROUNDS: u32 = 100_000;
pub const SALT_SIZE: usize = 16;

const PIN_HASH_INFO: &[u8] = b"Totem-PinVerifier-v1";
const DERIVED_KEY_INFO: &[u8] = b"Totem-BackupKey-v1";

#[derive(Error, Debug)]
pub enum HashingError {
    #[error("Hashing failed")]
    HashingFailed,
    #[error("Invalid salt")]
    InvalidSalt,
    #[error("Invalid work factor")]
    InvalidRounds,
}

pub type Result<T> = std::result::Result<T, HashingError>;

/// Secret material derived from a PIN.
///
/// Both halves come from the same PBKDF2 run, so they share its work factor.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PinMaterial {
    /// Stored verifier compared on unlock
    pub pin_hash: [u8; 32],
    /// Symmetric key used to encrypt backups
    pub derived_key: [u8; 32],
}

/// Derive the PIN verifier and backup key from `(pin, salt)`
///
/// # Arguments
/// * `pin` - The user's PIN
/// * `salt` - 16-byte random salt stored with the credential
/// * `rounds` - PBKDF2-HMAC-SHA256 iteration count
///
/// # Returns
/// `PinMaterial` holding the verifier hash and the derived key
pub fn derive_pin_material(pin: &str, salt: &[u8], rounds: u32) -> Result<PinMaterial> {
    if salt.len() < SALT_SIZE {
        return Err(HashingError::InvalidSalt);
    }
    if rounds == 0 {
        return Err(HashingError::InvalidRounds);
    }

    let mut master = [0u8; 32];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(pin.as_bytes(), salt, rounds, &mut master)
        .map_err(|_| HashingError::HashingFailed)?;

    let hkdf = Hkdf::<Sha256>::new(Some(salt), &master);
    master.zeroize();

    let mut material = PinMaterial {
        pin_hash: [0u8; 32],
        derived_key: [0u8; 32],
    };
    hkdf.expand(PIN_HASH_INFO, &mut material.pin_hash)
        .map_err(|_| HashingError::HashingFailed)?;
    hkdf.expand(DERIVED_KEY_INFO, &mut material.derived_key)
        .map_err(|_| HashingError::HashingFailed)?;

    Ok(material)
}

/// Lowercase hex SHA-256
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Generate a random salt
///
/// # Returns
/// 16-byte salt
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Constant-time comparison of two byte slices
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
