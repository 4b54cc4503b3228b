#![no_main]
use libfuzzer_sys::fuzz_target;
use totem_core::crypto::{decrypt_for_group, encrypt_for_group};

fuzz_target!(|data: &[u8]| {
    if data.len() < 33 {
        return;
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&data[..32]);
    let plaintext = &data[32..];

    if let Ok(sealed) = encrypt_for_group(&key, plaintext) {
        let opened = decrypt_for_group(&key, &sealed)
            .expect("Decryption of a fresh group message must succeed");
        assert_eq!(opened, plaintext, "Group cipher round-trip mismatch");
    }

    // Arbitrary input as an encoded message must not panic
    if let Ok(text) = std::str::from_utf8(plaintext) {
        let _ = decrypt_for_group(&key, text);
    }
});
