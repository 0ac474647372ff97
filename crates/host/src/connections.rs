// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted connection registry.
//!
//! Only identity fields are stored (id, name, url, active). Auth state is
//! derived from the token cache at query time, never persisted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ddk_core::{Connection, ConnectionId};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionStoreError {
    #[error("connection store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("unknown connection: {0}")]
    Unknown(ConnectionId),
}

/// Connection registry persisted as one JSON file.
pub struct ConnectionStore {
    path: PathBuf,
    connections: Mutex<BTreeMap<ConnectionId, Connection>>,
}

impl ConnectionStore {
    /// Open the store, loading existing connections if the file exists.
    pub fn open(path: &Path) -> Result<Self, ConnectionStoreError> {
        let connections = match std::fs::read(path) {
            Ok(bytes) => {
                let list: Vec<Connection> = serde_json::from_slice(&bytes)?;
                list.into_iter().map(|c| (c.id.clone(), c)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path: path.to_path_buf(), connections: Mutex::new(connections) })
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Connection> {
        self.connections.lock().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Connection> {
        self.connections.lock().values().cloned().collect()
    }

    /// Insert or replace a connection and persist.
    pub fn upsert(&self, connection: Connection) -> Result<(), ConnectionStoreError> {
        let mut connections = self.connections.lock();
        connections.insert(connection.id.clone(), connection);
        self.save(&connections)
    }

    /// Remove a connection. Destroying a connection is explicit only.
    pub fn remove(&self, id: &ConnectionId) -> Result<Connection, ConnectionStoreError> {
        let mut connections = self.connections.lock();
        let removed =
            connections.remove(id).ok_or_else(|| ConnectionStoreError::Unknown(id.clone()))?;
        self.save(&connections)?;
        Ok(removed)
    }

    /// Mark one connection active, clearing the flag on the others.
    pub fn set_active(&self, id: &ConnectionId) -> Result<(), ConnectionStoreError> {
        let mut connections = self.connections.lock();
        if !connections.contains_key(id) {
            return Err(ConnectionStoreError::Unknown(id.clone()));
        }
        for (key, connection) in connections.iter_mut() {
            connection.active = key == id;
        }
        self.save(&connections)
    }

    fn save(&self, connections: &BTreeMap<ConnectionId, Connection>) -> Result<(), ConnectionStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let list: Vec<&Connection> = connections.values().collect();
        let bytes = serde_json::to_vec_pretty(&list)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "connections_tests.rs"]
mod tests;
