// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tempfile::tempdir;

use super::*;

#[test]
fn seal_open_roundtrip() {
    let temp = tempdir().unwrap();
    let key = load_or_create_key(&temp.path().join("token.key")).unwrap();

    let sealed = seal(&key, b"secret payload").unwrap();
    assert_ne!(&sealed[..], b"secret payload");
    assert_eq!(open(&key, &sealed).unwrap(), b"secret payload");
}

#[test]
fn key_is_stable_across_loads() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("token.key");

    let key = load_or_create_key(&path).unwrap();
    let sealed = seal(&key, b"data").unwrap();

    let reloaded = load_or_create_key(&path).unwrap();
    assert_eq!(open(&reloaded, &sealed).unwrap(), b"data");
}

#[test]
fn ciphertext_never_contains_plaintext() {
    let temp = tempdir().unwrap();
    let key = load_or_create_key(&temp.path().join("token.key")).unwrap();

    let sealed = seal(&key, b"very-secret-token").unwrap();
    let haystack = String::from_utf8_lossy(&sealed);
    assert!(!haystack.contains("very-secret-token"));
}

#[test]
fn wrong_key_fails_to_open() {
    let temp = tempdir().unwrap();
    let key = load_or_create_key(&temp.path().join("a.key")).unwrap();
    let other = load_or_create_key(&temp.path().join("b.key")).unwrap();

    let sealed = seal(&key, b"data").unwrap();
    assert!(matches!(open(&other, &sealed), Err(CryptoError::Decrypt)));
}

#[test]
fn truncated_blob_is_corrupt() {
    let temp = tempdir().unwrap();
    let key = load_or_create_key(&temp.path().join("token.key")).unwrap();
    assert!(matches!(open(&key, b"DDK1"), Err(CryptoError::Corrupt)));
}

#[cfg(unix)]
#[test]
fn key_file_is_user_private() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempdir().unwrap();
    let path = temp.path().join("token.key");
    load_or_create_key(&path).unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
