use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroize;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;
pub const TAG_SIZE: usize = 16;

const GROUP_MESSAGE_INFO: &[u8] = b"Totem-GroupMessageKey-v1";

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Malformed ciphertext encoding")]
    MalformedEncoding,
}

pub type Result<T> = std::result::Result<T, EncryptionError>;

/// Encrypt a message using XChaCha20-Poly1305
///
/// # Arguments
/// * `plaintext` - The message to encrypt
/// * `key` - 32-byte encryption key
///
/// # Returns
/// Encrypted message with prepended nonce (24 bytes + ciphertext + tag)
pub fn encrypt_message(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != KEY_SIZE {
        return Err(EncryptionError::InvalidKeyLength);
    }

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    seal(plaintext, key, &nonce_bytes)
}

/// Decrypt a message using XChaCha20-Poly1305
///
/// # Arguments
/// * `encrypted_data` - Encrypted message with prepended nonce (24 bytes + ciphertext)
/// * `key` - 32-byte encryption key
///
/// # Returns
/// Decrypted plaintext
pub fn decrypt_message(encrypted_data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != KEY_SIZE {
        return Err(EncryptionError::InvalidKeyLength);
    }

    // nonce + tag
    if encrypted_data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(EncryptionError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = encrypted_data.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);

    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptionError::InvalidKeyLength)?;

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| EncryptionError::DecryptionFailed)
}

/// Generate a random 32-byte key
pub fn generate_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

/// Encrypt a chat message under a group key.
///
/// A fresh 24-byte nonce is drawn per message and a one-off message key is
/// derived as `HKDF-SHA256(salt = nonce, ikm = group_key)`, so the group
/// key itself never touches the cipher.
///
/// # Returns
/// `base64(nonce || ciphertext || tag)`
pub fn encrypt_for_group(group_key: &[u8], plaintext: &[u8]) -> Result<String> {
    if group_key.len() != KEY_SIZE {
        return Err(EncryptionError::InvalidKeyLength);
    }

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let mut message_key = derive_group_message_key(group_key, &nonce_bytes)?;
    let sealed = seal(plaintext, &message_key, &nonce_bytes);
    message_key.zeroize();

    Ok(STANDARD.encode(sealed?))
}

/// Reverse of [`encrypt_for_group`]
pub fn decrypt_for_group(group_key: &[u8], encoded: &str) -> Result<Vec<u8>> {
    if group_key.len() != KEY_SIZE {
        return Err(EncryptionError::InvalidKeyLength);
    }

    let raw = STANDARD
        .decode(encoded.trim())
        .map_err(|_| EncryptionError::MalformedEncoding)?;
    if raw.len() < NONCE_SIZE + TAG_SIZE {
        return Err(EncryptionError::MalformedEncoding);
    }

    let mut message_key = derive_group_message_key(group_key, &raw[..NONCE_SIZE])?;
    let opened = decrypt_message(&raw, &message_key);
    message_key.zeroize();

    opened
}

fn derive_group_message_key(group_key: &[u8], nonce: &[u8]) -> Result<[u8; KEY_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(Some(nonce), group_key);
    let mut message_key = [0u8; KEY_SIZE];
    hkdf.expand(GROUP_MESSAGE_INFO, &mut message_key)
        .map_err(|_| EncryptionError::EncryptionFailed)?;
    Ok(message_key)
}

fn seal(plaintext: &[u8], key: &[u8], nonce_bytes: &[u8; NONCE_SIZE]) -> Result<Vec<u8>> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptionError::InvalidKeyLength)?;
    let nonce = XNonce::from_slice(nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptionError::EncryptionFailed)?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = generate_key();
        let plaintext = b"Hello, Totem!";

        let encrypted = encrypt_message(plaintext, &key).unwrap();
        assert_eq!(encrypted.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);

        let decrypted = decrypt_message(&encrypted, &key).unwrap();
        assert_eq!(plaintext, decrypted.as_slice());
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let key1 = generate_key();
        let key2 = generate_key();

        let encrypted = encrypt_message(b"Secret message", &key1).unwrap();
        assert!(decrypt_message(&encrypted, &key2).is_err());
    }

    #[test]
    fn test_invalid_key_length() {
        let short_key = [0u8; 16];
        assert!(matches!(
            encrypt_message(b"Test", &short_key),
            Err(EncryptionError::InvalidKeyLength)
        ));
        assert!(encrypt_for_group(&short_key, b"Test").is_err());
    }

    #[test]
    fn test_group_cipher_roundtrip_with_fresh_nonces() {
        let key = generate_key();

        let first = encrypt_for_group(&key, b"meet at dawn").unwrap();
        let second = encrypt_for_group(&key, b"meet at dawn").unwrap();
        assert_ne!(first, second);

        assert_eq!(decrypt_for_group(&key, &first).unwrap(), b"meet at dawn");
        assert_eq!(decrypt_for_group(&key, &second).unwrap(), b"meet at dawn");
    }

    #[test]
    fn test_group_cipher_empty_plaintext() {
        let key = generate_key();
        let sealed = encrypt_for_group(&key, b"").unwrap();
        assert!(decrypt_for_group(&key, &sealed).unwrap().is_empty());
    }

    #[test]
    fn test_group_cipher_rejects_malformed_input() {
        let key = generate_key();

        assert!(matches!(
            decrypt_for_group(&key, "%%% not base64"),
            Err(EncryptionError::MalformedEncoding)
        ));
        assert!(matches!(
            decrypt_for_group(&key, &STANDARD.encode([0u8; 10])),
            Err(EncryptionError::MalformedEncoding)
        ));

        let sealed = encrypt_for_group(&key, b"payload").unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        assert!(matches!(
            decrypt_for_group(&key, &STANDARD.encode(raw)),
            Err(EncryptionError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_group_cipher_wrong_group_key() {
        let sealed = encrypt_for_group(&generate_key(), b"payload").unwrap();
        assert!(decrypt_for_group(&generate_key(), &sealed).is_err());
    }
}
