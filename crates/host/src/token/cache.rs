// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Encrypted on-disk token cache.
//!
//! One file per user, read at startup and rewritten atomically on change.
//! A corrupt or undecryptable cache is treated as empty (the user logs in
//! again) rather than blocking startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chacha20poly1305::Key;
use ddk_core::ConnectionId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::crypto;
use super::TokenError;

/// One cached token record per connection.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenRecord {
    pub access_token: String,
    pub expires_at_unix: u64,
    pub principal: String,
    pub refresh_token: String,
    /// Set after a failed refresh; cleared by the next interactive login.
    #[serde(default)]
    pub invalid: bool,
}

// Token material stays out of Debug output.
impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"<redacted>")
            .field("expires_at_unix", &self.expires_at_unix)
            .field("principal", &self.principal)
            .field("refresh_token", &"<redacted>")
            .field("invalid", &self.invalid)
            .finish()
    }
}

/// Encrypted token store keyed by connection.
pub struct TokenCache {
    path: PathBuf,
    key: Key,
    records: Mutex<HashMap<ConnectionId, TokenRecord>>,
}

impl TokenCache {
    /// Open the cache at `path`, creating the key file beside it on first use.
    pub fn open(path: &Path) -> Result<Self, TokenError> {
        let key_path = path.with_extension("key");
        let key = crypto::load_or_create_key(&key_path)
            .map_err(|e| TokenError::Cache(e.to_string()))?;

        let records = match std::fs::read(path) {
            Ok(sealed) => match crypto::open(&key, &sealed)
                .ok()
                .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            {
                Some(records) => records,
                None => {
                    warn!("token cache unreadable; starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(TokenError::Cache(e.to_string())),
        };
        Ok(Self { path: path.to_path_buf(), key, records: Mutex::new(records) })
    }

    pub fn get(&self, id: &ConnectionId) -> Option<TokenRecord> {
        self.records.lock().get(id).cloned()
    }

    /// Principal of the cached record, if any. Used to derive auth state.
    pub fn principal(&self, id: &ConnectionId) -> Option<String> {
        self.records.lock().get(id).map(|r| r.principal.clone())
    }

    pub fn put(&self, id: ConnectionId, record: TokenRecord) -> Result<(), TokenError> {
        let mut records = self.records.lock();
        records.insert(id, record);
        self.save(&records)
    }

    pub fn remove(&self, id: &ConnectionId) -> Result<(), TokenError> {
        let mut records = self.records.lock();
        if records.remove(id).is_none() {
            return Ok(());
        }
        self.save(&records)
    }

    /// Flag a record invalid after a failed refresh. The record (and its
    /// principal) stays visible until the next login replaces it.
    pub fn mark_invalid(&self, id: &ConnectionId) -> Result<(), TokenError> {
        let mut records = self.records.lock();
        let mut changed = false;
        if let Some(record) = records.get_mut(id) {
            if !record.invalid {
                record.invalid = true;
                changed = true;
            }
        }
        if changed {
            return self.save(&records);
        }
        Ok(())
    }

    fn save(&self, records: &HashMap<ConnectionId, TokenRecord>) -> Result<(), TokenError> {
        let bytes =
            serde_json::to_vec(records).map_err(|e| TokenError::Cache(e.to_string()))?;
        let sealed =
            crypto::seal(&self.key, &bytes).map_err(|e| TokenError::Cache(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TokenError::Cache(e.to_string()))?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, sealed).map_err(|e| TokenError::Cache(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| TokenError::Cache(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
