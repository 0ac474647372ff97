// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin manifest parsing.
//!
//! A plugin ships a `manifest.json` beside its binary. Unknown fields are
//! ignored so older hosts can load newer plugins.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::PluginId;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid manifest {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Backend (worker-side) portion of a plugin manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendManifest {
    /// Path to the plugin binary, relative to the manifest directory.
    pub assembly: PathBuf,
    /// Entry symbol exported by the plugin binary.
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
}

fn default_entry_point() -> String {
    "ddk_plugin_entry".to_string()
}

/// Plugin manifest consumed by the host at discovery time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: PluginId,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub backend: BackendManifest,
    /// UI remote configuration, opaque to the runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<serde_json::Value>,
}

impl PluginManifest {
    /// Load and validate a manifest from a `manifest.json` path.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let bytes = std::fs::read(path)
            .map_err(|source| ManifestError::Io { path: path.to_path_buf(), source })?;
        let manifest: Self = serde_json::from_slice(&bytes)
            .map_err(|source| ManifestError::Parse { path: path.to_path_buf(), source })?;
        manifest.validate(path)?;
        Ok(manifest)
    }

    fn validate(&self, path: &Path) -> Result<(), ManifestError> {
        if self.id.is_empty() {
            return Err(ManifestError::Invalid {
                path: path.to_path_buf(),
                reason: "empty plugin id".to_string(),
            });
        }
        if self.backend.assembly.as_os_str().is_empty() {
            return Err(ManifestError::Invalid {
                path: path.to_path_buf(),
                reason: "empty backend.assembly".to_string(),
            });
        }
        Ok(())
    }

    /// Absolute path of the plugin binary, resolved against the manifest directory.
    pub fn assembly_path(&self, manifest_path: &Path) -> PathBuf {
        if self.backend.assembly.is_absolute() {
            return self.backend.assembly.clone();
        }
        manifest_path
            .parent()
            .map(|dir| dir.join(&self.backend.assembly))
            .unwrap_or_else(|| self.backend.assembly.clone())
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
