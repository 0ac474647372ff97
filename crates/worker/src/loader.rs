// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dynamic plugin loading.
//!
//! A plugin is a cdylib exporting `ddk_plugin_entry` (see `ddk_sdk::declare_plugin!`).
//! The worker and the plugin share exactly one ABI surface (the sdk crate);
//! everything else the plugin links stays private to its library, so plugins
//! in distinct workers never collide.
//!
//! Native dependency resolution, in order:
//! 1. libraries listed in a `deps.json` manifest beside the plugin,
//! 2. probing the plugin directory for the platform-specific library name.
//!
//! Dependencies loaded from the worker binary's own directory join the
//! default set shared by every plugin this worker loads; plugin-private
//! dependencies are dropped together with the plugin's library.

use std::path::{Path, PathBuf};

use ddk_sdk::abi::{PluginDecl, PluginEntryFn};
use ddk_sdk::{Plugin, SDK_VERSION};
use libloading::Library;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("plugin binary not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to load {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("entry symbol {symbol:?} not found in {path}")]
    EntryMissing { path: PathBuf, symbol: String },

    #[error("plugin was built against sdk {plugin} but the worker runs sdk {worker}")]
    SdkVersionMismatch { plugin: String, worker: String },

    #[error("native dependency {name} not found beside {path}")]
    NativeDependencyMissing { name: String, path: PathBuf },

    #[error("failed to read dependency manifest {path}: {message}")]
    DepsManifest { path: PathBuf, message: String },
}

/// Optional `deps.json` beside the plugin binary.
#[derive(Debug, Deserialize)]
struct DepsManifest {
    /// Bare library names ("sqlite3"), resolved to platform file names.
    #[serde(default)]
    native: Vec<String>,
}

/// A plugin instance together with the libraries keeping its code mapped.
///
/// Field order is load-bearing: the plugin box drops before the libraries
/// that contain its code.
pub struct LoadedPlugin {
    plugin: Option<Box<dyn Plugin>>,
    _private_deps: Vec<Library>,
    _library: Option<Library>,
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin").finish_non_exhaustive()
    }
}

impl LoadedPlugin {
    /// Wrap an in-process plugin (no dynamic library). Used by hosts that
    /// embed a plugin directly and by tests.
    pub fn in_process(plugin: Box<dyn Plugin>) -> Self {
        Self { plugin: Some(plugin), _private_deps: Vec::new(), _library: None }
    }

    pub fn plugin(&self) -> &dyn Plugin {
        // Invariant: `plugin` is Some until `dispose` consumes it.
        match &self.plugin {
            Some(plugin) => plugin.as_ref(),
            None => unreachable!("plugin used after dispose"),
        }
    }

    /// Call the plugin's dispose, then release the instance so the library
    /// can be unloaded.
    pub async fn dispose(&mut self) {
        if let Some(plugin) = self.plugin.take() {
            plugin.dispose().await;
            drop(plugin);
        }
        // Libraries drop with `self`, after the instance is gone.
    }
}

/// Loads plugin binaries and keeps the worker-wide default set alive.
#[derive(Default)]
pub struct PluginLoader {
    /// Libraries shared across every plugin loaded by this worker.
    default_set: Vec<Library>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a plugin binary and construct its instance.
    pub fn load(&mut self, path: &Path, entry_point: &str) -> Result<LoadedPlugin, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::NotFound(path.to_path_buf()));
        }
        let private_deps = self.load_native_deps(path)?;

        #[allow(unsafe_code)]
        // SAFETY: the plugin is compiled against the same ddk-sdk as this
        // worker; the version gate below rejects anything else before the
        // instance is constructed.
        let (library, decl) = unsafe {
            let library = Library::new(path).map_err(|e| LoaderError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            let entry: libloading::Symbol<'_, PluginEntryFn> = library
                .get(entry_point.as_bytes())
                .map_err(|_| LoaderError::EntryMissing {
                    path: path.to_path_buf(),
                    symbol: entry_point.to_string(),
                })?;
            let decl: PluginDecl = entry();
            (library, decl)
        };

        if decl.sdk_version != SDK_VERSION {
            return Err(LoaderError::SdkVersionMismatch {
                plugin: decl.sdk_version.to_string(),
                worker: SDK_VERSION.to_string(),
            });
        }

        let plugin = (decl.create)();
        info!(
            plugin_id = plugin.plugin_id(),
            version = plugin.version(),
            path = %path.display(),
            "plugin loaded"
        );
        Ok(LoadedPlugin {
            plugin: Some(plugin),
            _private_deps: private_deps,
            _library: Some(library),
        })
    }

    /// Resolve and map native dependencies for a plugin at `path`.
    fn load_native_deps(&mut self, path: &Path) -> Result<Vec<Library>, LoaderError> {
        let plugin_dir = match path.parent() {
            Some(dir) => dir,
            None => return Ok(Vec::new()),
        };
        let names = native_dep_names(plugin_dir)?;
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let worker_dir = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf));
        let mut private = Vec::new();
        for name in names {
            let file_name = platform_library_name(&name);

            // Shared location first: next to the worker binary, loaded into
            // the default set so all plugins in this worker reuse it.
            if let Some(ref worker_dir) = worker_dir {
                let shared = worker_dir.join(&file_name);
                if shared.exists() {
                    self.default_set.push(load_library(&shared)?);
                    debug!(name, path = %shared.display(), "native dependency joined default set");
                    continue;
                }
            }

            let local = plugin_dir.join(&file_name);
            if local.exists() {
                private.push(load_library(&local)?);
                debug!(name, path = %local.display(), "native dependency loaded plugin-private");
                continue;
            }
            return Err(LoaderError::NativeDependencyMissing {
                name,
                path: plugin_dir.to_path_buf(),
            });
        }
        Ok(private)
    }
}

fn load_library(path: &Path) -> Result<Library, LoaderError> {
    #[allow(unsafe_code)]
    // SAFETY: native dependencies are plain shared libraries with no
    // initialization contract beyond their own constructors.
    unsafe {
        Library::new(path).map_err(|e| LoaderError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Names from `deps.json` if present, else empty.
fn native_dep_names(plugin_dir: &Path) -> Result<Vec<String>, LoaderError> {
    let manifest_path = plugin_dir.join("deps.json");
    match std::fs::read(&manifest_path) {
        Ok(bytes) => {
            let manifest: DepsManifest =
                serde_json::from_slice(&bytes).map_err(|e| LoaderError::DepsManifest {
                    path: manifest_path.clone(),
                    message: e.to_string(),
                })?;
            Ok(manifest.native)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(LoaderError::DepsManifest { path: manifest_path, message: e.to_string() }),
    }
}

/// Platform file name for a bare library name.
fn platform_library_name(name: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        format!("{name}.dll")
    }
    #[cfg(target_os = "macos")]
    {
        format!("lib{name}.dylib")
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        format!("lib{name}.so")
    }
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
