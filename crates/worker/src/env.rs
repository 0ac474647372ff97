// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the worker process.
//!
//! The host passes everything a worker needs via `DDK_*` environment
//! variables, never via command-line arguments.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerEnvError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("unsupported transport {0:?} (only \"uds\" is supported)")]
    UnsupportedTransport(String),
}

/// Worker process configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct WorkerEnv {
    pub plugin_id: String,
    /// Path of the plugin binary to load.
    pub plugin_assembly: PathBuf,
    /// Entry symbol exported by the plugin binary.
    pub plugin_entry: String,
    /// Path the forward endpoint must bind.
    pub forward_socket: PathBuf,
}

/// Read the worker environment, validating the transport family.
pub fn worker_env() -> Result<WorkerEnv, WorkerEnvError> {
    let transport = std::env::var("DDK_TRANSPORT").unwrap_or_else(|_| "uds".to_string());
    if transport != "uds" {
        return Err(WorkerEnvError::UnsupportedTransport(transport));
    }
    Ok(WorkerEnv {
        plugin_id: require("DDK_PLUGIN_ID")?,
        plugin_assembly: PathBuf::from(require("DDK_PLUGIN_ASSEMBLY")?),
        plugin_entry: std::env::var("DDK_PLUGIN_ENTRY")
            .unwrap_or_else(|_| "ddk_plugin_entry".to_string()),
        forward_socket: PathBuf::from(require("DDK_FORWARD_SOCKET")?),
    })
}

fn require(name: &'static str) -> Result<String, WorkerEnvError> {
    std::env::var(name).ok().filter(|v| !v.is_empty()).ok_or(WorkerEnvError::Missing(name))
}

/// Log filter for the worker (stderr only; stdout is reserved for the
/// readiness line).
pub fn log_filter() -> String {
    std::env::var("DDK_LOG").unwrap_or_else(|_| "info".to_string())
}
