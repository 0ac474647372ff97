// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin discovery: scan the plugins directory for manifests.

use std::path::{Path, PathBuf};

use ddk_core::PluginManifest;
use tracing::warn;

/// One discovered plugin: its manifest and where it was found.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub manifest: PluginManifest,
    pub manifest_path: PathBuf,
}

impl DiscoveredPlugin {
    /// Absolute path of the plugin binary.
    pub fn assembly_path(&self) -> PathBuf {
        self.manifest.assembly_path(&self.manifest_path)
    }
}

/// Scan `plugins_dir/*/manifest.json`. Unreadable or invalid manifests are
/// logged and skipped; discovery never fails the host.
pub fn discover_plugins(plugins_dir: &Path) -> Vec<DiscoveredPlugin> {
    let entries = match std::fs::read_dir(plugins_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut plugins = Vec::new();
    for entry in entries.flatten() {
        let manifest_path = entry.path().join("manifest.json");
        if !manifest_path.is_file() {
            continue;
        }
        match PluginManifest::load(&manifest_path) {
            Ok(manifest) => plugins.push(DiscoveredPlugin { manifest, manifest_path }),
            Err(e) => warn!(error = %e, "skipping plugin with invalid manifest"),
        }
    }
    plugins.sort_by(|a, b| a.manifest.id.cmp(&b.manifest.id));
    plugins
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
