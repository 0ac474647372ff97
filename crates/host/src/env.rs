// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the host.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostEnvError {
    #[error("cannot resolve a state directory (set DDK_STATE_DIR or HOME)")]
    NoStateDir,
}

/// Resolve state directory: DDK_STATE_DIR > XDG_STATE_HOME/ddk > ~/.local/state/ddk
pub fn state_dir() -> Result<PathBuf, HostEnvError> {
    if let Ok(dir) = std::env::var("DDK_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("ddk"));
    }
    let home = std::env::var("HOME").map_err(|_| HostEnvError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/ddk"))
}

/// Per-user data directory for plugin storage and embedded stores.
pub fn data_dir() -> Result<PathBuf, HostEnvError> {
    if let Ok(dir) = std::env::var("DDK_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir().map(|d| d.join("ddk")).ok_or(HostEnvError::NoStateDir)
}

/// Directory for worker endpoint sockets, under the user temp directory.
pub fn runtime_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DDK_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    std::env::temp_dir().join(format!("ddk-{}", std::process::id()))
}

/// Path of the worker binary. Defaults to `ddk-worker` beside the host.
pub fn worker_binary() -> PathBuf {
    if let Ok(path) = std::env::var("DDK_WORKER_BINARY") {
        return PathBuf::from(path);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("ddk-worker")))
        .unwrap_or_else(|| PathBuf::from("ddk-worker"))
}

fn duration_var(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Time allowed for a worker to print its readiness line.
pub fn start_timeout() -> Duration {
    duration_var("DDK_START_TIMEOUT_MS", Duration::from_secs(15))
}

/// Default RPC round-trip timeout.
pub fn rpc_timeout() -> Duration {
    duration_var("DDK_RPC_TIMEOUT_MS", Duration::from_secs(30))
}

/// Interval between idle health pings.
pub fn health_interval() -> Duration {
    duration_var("DDK_HEALTH_INTERVAL_MS", Duration::from_secs(10))
}

/// Per-ping response deadline.
pub fn health_ping_timeout() -> Duration {
    duration_var("DDK_HEALTH_PING_TIMEOUT_MS", Duration::from_secs(5))
}

/// Grace period after `Shutdown` returns before escalating.
pub fn shutdown_grace() -> Duration {
    duration_var("DDK_SHUTDOWN_GRACE_MS", Duration::from_secs(2))
}

/// Log filter for the host.
pub fn log_filter() -> String {
    std::env::var("DDK_LOG").unwrap_or_else(|_| "info".to_string())
}
