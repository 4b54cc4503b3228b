use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Compact `r || s` encoding
pub const SIGNATURE_SIZE: usize = 64;

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Signing failed")]
    SigningFailed,
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Invalid private key")]
    InvalidKey,
}

pub type Result<T> = std::result::Result<T, SigningError>;

/// Sign a message with a Totem private key
///
/// The message is hashed with SHA-256 and the digest is signed with
/// secp256k1 ECDSA (low-S normalized).
///
/// # Arguments
/// * `message` - Data to sign
/// * `private_key` - 32-byte secp256k1 private key
///
/// # Returns
/// Lowercase hex of the 64-byte compact signature
pub fn sign(message: &[u8], private_key: &[u8]) -> Result<String> {
    if private_key.len() != 32 {
        return Err(SigningError::InvalidKeyLength);
    }

    let signing_key = SigningKey::from_slice(private_key).map_err(|_| SigningError::InvalidKey)?;
    let digest: [u8; 32] = Sha256::digest(message).into();

    let signature: Signature = signing_key
        .sign_prehash(&digest)
        .map_err(|_| SigningError::SigningFailed)?;

    Ok(hex::encode(signature.to_bytes()))
}

/// Verify a signature produced by [`sign`]
///
/// Never fails: malformed hex, wrong lengths, invalid points and bad
/// signatures all yield `false`.
///
/// # Arguments
/// * `message` - Original data
/// * `signature_hex` - 128 hex chars
/// * `public_key_hex` - 66 hex chars (compressed secp256k1 point)
pub fn verify(message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool {
    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) if bytes.len() == SIGNATURE_SIZE => bytes,
        _ => return false,
    };
    let public_key_bytes = match hex::decode(public_key_hex) {
        Ok(bytes) if bytes.len() == 33 => bytes,
        _ => return false,
    };

    let verifying_key = match VerifyingKey::from_sec1_bytes(&public_key_bytes) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let signature = match Signature::from_slice(&signature_bytes) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    let digest: [u8; 32] = Sha256::digest(message).into();
    verifying_key.verify_prehash(&digest, &signature).is_ok()
}
