#![no_main]
use libfuzzer_sys::fuzz_target;
use totem_core::backup::{open_backup, BackupFile, BackupPackage, QrPackage};
use totem_core::crypto::encryption;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let key = [7u8; encryption::KEY_SIZE];

    // Parsing and opening arbitrary packages must never panic
    if let Ok(qr) = QrPackage::from_json(text) {
        let package = BackupPackage::from_qr(qr);
        let _ = package.joined_payload();
        let _ = open_backup(&package, &key);
    }

    if let Ok(file) = BackupFile::from_json(text) {
        if let Ok(package) = BackupPackage::from_file(file) {
            let _ = open_backup(&package, &key);
        }
    }
});
