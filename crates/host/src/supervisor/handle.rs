// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handle to one running worker process.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use ddk_core::WorkerKey;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::rpc::ForwardClient;

/// Worker health as tracked by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Starting,
    Ready,
    Unhealthy,
    Terminated,
}

ddk_core::simple_display! {
    HealthState {
        Starting => "starting",
        Ready => "ready",
        Unhealthy => "unhealthy",
        Terminated => "terminated",
    }
}

/// One supervised worker: process, RPC client, endpoints, health.
pub struct WorkerHandle {
    key: WorkerKey,
    pid: u32,
    child: tokio::sync::Mutex<Child>,
    pub(crate) client: ForwardClient,
    forward_path: PathBuf,
    reverse_path: PathBuf,
    health: parking_lot::Mutex<HealthState>,
    last_heartbeat_ms: AtomicU64,
    exit_code: parking_lot::Mutex<Option<i32>>,
    /// Stops this worker's token callback endpoint.
    pub(crate) reverse_shutdown: CancellationToken,
}

impl WorkerHandle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        key: WorkerKey,
        pid: u32,
        child: Child,
        client: ForwardClient,
        forward_path: PathBuf,
        reverse_path: PathBuf,
        reverse_shutdown: CancellationToken,
    ) -> Self {
        Self {
            key,
            pid,
            child: tokio::sync::Mutex::new(child),
            client,
            forward_path,
            reverse_path,
            health: parking_lot::Mutex::new(HealthState::Starting),
            last_heartbeat_ms: AtomicU64::new(0),
            exit_code: parking_lot::Mutex::new(None),
            reverse_shutdown,
        }
    }

    pub fn key(&self) -> &WorkerKey {
        &self.key
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn forward_path(&self) -> &Path {
        &self.forward_path
    }

    pub fn reverse_path(&self) -> &Path {
        &self.reverse_path
    }

    pub fn health(&self) -> HealthState {
        *self.health.lock()
    }

    /// Exit code recorded by the exit watcher, for diagnostics.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock()
    }

    pub fn last_heartbeat_ms(&self) -> u64 {
        self.last_heartbeat_ms.load(Ordering::Relaxed)
    }

    pub(crate) fn set_health(&self, health: HealthState) {
        let mut current = self.health.lock();
        if *current != health {
            debug!(key = %self.key, from = %*current, to = %health, "worker health");
            *current = health;
        }
    }

    pub(crate) fn heartbeat(&self, now_ms: u64) {
        self.last_heartbeat_ms.store(now_ms, Ordering::Relaxed);
    }

    pub(crate) fn record_exit(&self, code: i32) {
        self.exit_code.lock().get_or_insert(code);
        self.set_health(HealthState::Terminated);
    }

    /// Non-blocking exit probe. Returns the exit code if the process is gone.
    pub(crate) async fn try_wait(&self) -> Option<i32> {
        let mut child = self.child.lock().await;
        match child.try_wait() {
            Ok(Some(status)) => Some(status.code().unwrap_or(-1)),
            _ => None,
        }
    }

    /// Deliver SIGTERM (unix). No-op if the process is already gone.
    pub(crate) fn signal_term(&self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            let _ = kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM);
        }
    }

    /// Forceful kill (SIGKILL).
    pub(crate) async fn kill(&self) {
        let mut child = self.child.lock().await;
        let _ = child.kill().await;
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("key", &self.key)
            .field("pid", &self.pid)
            .field("health", &self.health())
            .field("exit_code", &self.exit_code())
            .finish()
    }
}
