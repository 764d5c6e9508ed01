// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn returns_key_bytes_for_a_configured_queue() {
    let tmp = tempfile::tempdir().unwrap();
    let key = [7u8; PUBLIC_KEY_LEN];
    std::fs::write(tmp.path().join("rmq_test"), key).unwrap();

    let store = EncryptionKeyStore::new(tmp.path());
    assert_eq!(store.public_key_for("rmq_test"), Some(key.to_vec()));
}

#[test]
fn missing_key_file_is_none_not_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let store = EncryptionKeyStore::new(tmp.path());
    assert_eq!(store.public_key_for("unconfigured"), None);
}

#[test]
fn wrong_length_key_file_is_none() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("short"), [1u8; 10]).unwrap();

    let store = EncryptionKeyStore::new(tmp.path());
    assert_eq!(store.public_key_for("short"), None);
}
