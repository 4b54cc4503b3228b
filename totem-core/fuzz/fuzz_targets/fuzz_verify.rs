#![no_main]
use libfuzzer_sys::fuzz_target;
use totem_core::crypto::verify;

fuzz_target!(|data: &[u8]| {
    // verify() returns false on garbage; it must never panic
    let text = String::from_utf8_lossy(data);
    let mut parts = text.splitn(3, '|');
    let message = parts.next().unwrap_or_default();
    let signature = parts.next().unwrap_or_default();
    let public_key = parts.next().unwrap_or_default();

    let _ = verify(message.as_bytes(), signature, public_key);
});
