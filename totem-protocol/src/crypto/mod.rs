pub mod encryption;
pub mod hashing;
pub mod identity;
pub mod signing;

pub use encryption::{
    decrypt_for_group, decrypt_message, encrypt_for_group, encrypt_message, generate_key,
    EncryptionError,
};
pub use hashing::{
    constant_time_eq, derive_pin_material, generate_salt, sha256_hex, HashingError, PinMaterial,
    DEFAULT_PIN_KDF_ROUNDS,
};
pub use identity::{
    generate_identity, restore_identity, validate_identity, Identity, IdentityError,
};
pub use signing::{sign, verify, SigningError};
