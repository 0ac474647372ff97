// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! At-rest encryption for the token cache.
//!
//! File layout: 4-byte magic, 12-byte nonce, ChaCha20-Poly1305 ciphertext.
//! The key is 32 random bytes in a user-private (0600) key file beside the
//! cache; losing the key file only costs a re-login.

use std::path::Path;

use chacha20poly1305::aead::{Aead, OsRng};
use chacha20poly1305::{AeadCore, ChaCha20Poly1305, Key, KeyInit, Nonce};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"DDK1";
const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("key file is corrupt (expected 32 bytes)")]
    BadKey,

    #[error("cache file is corrupt")]
    Corrupt,

    #[error("cache decryption failed (wrong key?)")]
    Decrypt,
}

/// Load the cache key, creating one on first use.
pub fn load_or_create_key(path: &Path) -> Result<Key, CryptoError> {
    match std::fs::read(path) {
        Ok(bytes) => {
            if bytes.len() != 32 {
                return Err(CryptoError::BadKey);
            }
            Ok(*Key::from_slice(&bytes))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let key = ChaCha20Poly1305::generate_key(&mut OsRng);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            write_private(path, key.as_slice())?;
            Ok(key)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    file.flush()
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)
}

/// Encrypt `plaintext` with a fresh random nonce.
pub fn seal(key: &Key, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(key);
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher.encrypt(&nonce, plaintext).map_err(|_| CryptoError::Decrypt)?;

    let mut out = Vec::with_capacity(MAGIC.len() + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a sealed blob.
pub fn open(key: &Key, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < MAGIC.len() + NONCE_LEN || &sealed[..MAGIC.len()] != MAGIC {
        return Err(CryptoError::Corrupt);
    }
    let nonce = Nonce::from_slice(&sealed[MAGIC.len()..MAGIC.len() + NONCE_LEN]);
    let cipher = ChaCha20Poly1305::new(key);
    cipher.decrypt(nonce, &sealed[MAGIC.len() + NONCE_LEN..]).map_err(|_| CryptoError::Decrypt)
}

#[cfg(test)]
#[path = "crypto_tests.rs"]
mod tests;
