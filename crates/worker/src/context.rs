// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-side implementation of the plugin context.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ddk_core::{PluginEvent, PluginId};
use ddk_sdk::{ClientFactory, ContextError, PluginContext};
use parking_lot::Mutex;

use crate::events::EventBuffer;

/// Context handed to the loaded plugin at initialize.
pub struct WorkerContext {
    plugin_id: PluginId,
    storage_path: PathBuf,
    config_path: PathBuf,
    config_lock: Mutex<()>,
    connection_url: String,
    events: Arc<EventBuffer>,
    factory: Arc<ClientFactory>,
}

impl WorkerContext {
    pub fn new(
        plugin_id: PluginId,
        storage_path: PathBuf,
        connection_url: String,
        events: Arc<EventBuffer>,
        factory: Arc<ClientFactory>,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(&storage_path)?;
        let config_path = storage_path.join("config.json");
        Ok(Self {
            plugin_id,
            storage_path,
            config_path,
            config_lock: Mutex::new(()),
            connection_url,
            events,
            factory,
        })
    }

    /// Seed config defaults from the host. Existing keys win.
    pub fn seed_config(&self, defaults: &std::collections::HashMap<String, String>) -> Result<(), ContextError> {
        if defaults.is_empty() {
            return Ok(());
        }
        let _guard = self.config_lock.lock();
        let mut map = read_config(&self.config_path)?;
        for (key, value) in defaults {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
        write_config(&self.config_path, &map)
    }

    pub fn events(&self) -> &Arc<EventBuffer> {
        &self.events
    }
}

impl PluginContext for WorkerContext {
    fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    fn connection_url(&self) -> &str {
        &self.connection_url
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!("plugin", plugin_id = %self.plugin_id)
    }

    fn emit_event(&self, event: PluginEvent) {
        self.events.append(event);
    }

    fn get_config(&self, key: &str) -> Option<String> {
        let _guard = self.config_lock.lock();
        read_config(&self.config_path).ok()?.remove(key)
    }

    fn set_config(&self, key: &str, value: &str) -> Result<(), ContextError> {
        let _guard = self.config_lock.lock();
        let mut map = read_config(&self.config_path)?;
        map.insert(key.to_string(), value.to_string());
        write_config(&self.config_path, &map)
    }

    fn client_factory(&self) -> Arc<ClientFactory> {
        Arc::clone(&self.factory)
    }
}

fn read_config(path: &Path) -> Result<BTreeMap<String, String>, ContextError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(ContextError::Io(e)),
    }
}

/// Atomic rewrite: write a sibling temp file, then rename over the target.
fn write_config(path: &Path, map: &BTreeMap<String, String>) -> Result<(), ContextError> {
    let bytes = serde_json::to_vec_pretty(map)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
