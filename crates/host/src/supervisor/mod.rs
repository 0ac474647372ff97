// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process supervisor.
//!
//! Spawns one isolated worker per `(pluginId, instanceId)`, keys readiness
//! on the worker's `SOCKET_PATH=` stdout line, initializes it over forward
//! RPC, health-checks it while idle, and escalates shutdown from RPC to
//! SIGTERM to SIGKILL.

mod handle;
mod health;

pub use handle::{HealthState, WorkerHandle};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ddk_core::{Clock, Connection, CorrelationId, InstanceId, SystemClock, WorkerKey};
use ddk_wire::{ErrorCode, ForwardRequest, ForwardResponse, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::discovery::DiscoveredPlugin;
use crate::reverse::{bind_token_socket, serve_token_endpoint};
use crate::rpc::{EventSubscription, ForwardClient};
use crate::token::TokenService;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("worker start failed: {0}")]
    WorkerStartFailed(String),

    #[error("worker terminated")]
    WorkerTerminated,

    #[error("no worker running for {0}")]
    NotRunning(WorkerKey),

    #[error("{code}: {message}")]
    Command { code: ErrorCode, message: String },

    #[error(transparent)]
    Transport(#[from] ProtocolError),
}

/// Supervisor tuning; see `env.rs` for the environment overrides.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub worker_binary: PathBuf,
    pub runtime_dir: PathBuf,
    pub storage_root: PathBuf,
    pub start_timeout: Duration,
    pub rpc_timeout: Duration,
    pub health_interval: Duration,
    pub health_ping_timeout: Duration,
    pub health_strikes: u32,
    pub shutdown_grace: Duration,
}

impl SupervisorConfig {
    pub fn from_env(storage_root: PathBuf) -> Self {
        Self {
            worker_binary: crate::env::worker_binary(),
            runtime_dir: crate::env::runtime_dir(),
            storage_root,
            start_timeout: crate::env::start_timeout(),
            rpc_timeout: crate::env::rpc_timeout(),
            health_interval: crate::env::health_interval(),
            health_ping_timeout: crate::env::health_ping_timeout(),
            health_strikes: 3,
            shutdown_grace: crate::env::shutdown_grace(),
        }
    }
}

/// Supervises worker processes, keyed by `(pluginId, instanceId)`.
pub struct WorkerSupervisor {
    config: SupervisorConfig,
    tokens: Arc<dyn TokenService>,
    workers: Arc<parking_lot::Mutex<HashMap<WorkerKey, Arc<WorkerHandle>>>>,
}

impl WorkerSupervisor {
    pub fn new(config: SupervisorConfig, tokens: Arc<dyn TokenService>) -> Self {
        Self { config, tokens, workers: Arc::new(parking_lot::Mutex::new(HashMap::new())) }
    }

    pub fn get(&self, key: &WorkerKey) -> Option<Arc<WorkerHandle>> {
        self.workers.lock().get(key).cloned()
    }

    pub fn list(&self) -> Vec<Arc<WorkerHandle>> {
        self.workers.lock().values().cloned().collect()
    }

    /// The running worker for `key`, starting one if needed.
    pub async fn ensure_started(
        &self,
        plugin: &DiscoveredPlugin,
        instance: &InstanceId,
        connection: &Connection,
    ) -> Result<Arc<WorkerHandle>, SupervisorError> {
        let key = WorkerKey::new(plugin.manifest.id.clone(), instance.clone());
        if let Some(handle) = self.get(&key) {
            match handle.health() {
                HealthState::Ready | HealthState::Starting => return Ok(handle),
                HealthState::Unhealthy | HealthState::Terminated => {
                    self.workers.lock().remove(&key);
                }
            }
        }
        self.start(plugin, instance, connection).await
    }

    /// Spawn, await readiness, and initialize one worker.
    pub async fn start(
        &self,
        plugin: &DiscoveredPlugin,
        instance: &InstanceId,
        connection: &Connection,
    ) -> Result<Arc<WorkerHandle>, SupervisorError> {
        let key = WorkerKey::new(plugin.manifest.id.clone(), instance.clone());
        let (forward_path, reverse_path) = socket_paths(&self.config.runtime_dir, &key);

        // Reverse endpoint first: the worker may ask for a token as soon as
        // its plugin initializes.
        let reverse_listener = bind_token_socket(&reverse_path)
            .map_err(|e| SupervisorError::WorkerStartFailed(format!("token socket: {e}")))?;
        let reverse_shutdown = CancellationToken::new();
        tokio::spawn(serve_token_endpoint(
            reverse_listener,
            Arc::clone(&self.tokens),
            connection.id.clone(),
            reverse_shutdown.clone(),
        ));

        let _ = std::fs::remove_file(&forward_path);
        let spawn_result = Command::new(&self.config.worker_binary)
            .env("DDK_PLUGIN_ID", plugin.manifest.id.as_str())
            .env("DDK_PLUGIN_ASSEMBLY", plugin.assembly_path())
            .env("DDK_PLUGIN_ENTRY", &plugin.manifest.backend.entry_point)
            .env("DDK_FORWARD_SOCKET", &forward_path)
            .env("DDK_TRANSPORT", "uds")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawn_result {
            Ok(child) => child,
            Err(e) => {
                reverse_shutdown.cancel();
                let _ = std::fs::remove_file(&reverse_path);
                return Err(SupervisorError::WorkerStartFailed(format!("spawn: {e}")));
            }
        };
        let pid = child.id().unwrap_or_default();

        let advertised = match self.await_readiness(&mut child).await {
            Ok(path) => path,
            Err(e) => {
                let _ = child.kill().await;
                reverse_shutdown.cancel();
                let _ = std::fs::remove_file(&forward_path);
                let _ = std::fs::remove_file(&reverse_path);
                return Err(e);
            }
        };

        let client = ForwardClient::new(advertised.clone(), self.config.rpc_timeout);
        let storage_path = self
            .config
            .storage_root
            .join(plugin.manifest.id.as_str())
            .join(instance.as_str());
        let initialize = ForwardRequest::Initialize {
            plugin_id: plugin.manifest.id.clone(),
            storage_path,
            config: HashMap::new(),
            token_socket: reverse_path.clone(),
            connection_id: connection.id.clone(),
            connection_url: connection.url.clone(),
        };
        match client.request(&initialize).await {
            Ok(ForwardResponse::Initialized { plugin_name, plugin_version }) => {
                info!(key = %key, %plugin_name, %plugin_version, pid, "worker started");
            }
            Ok(ForwardResponse::Error { message, .. }) => {
                let _ = child.kill().await;
                reverse_shutdown.cancel();
                return Err(SupervisorError::WorkerStartFailed(format!(
                    "initialize rejected: {message}"
                )));
            }
            Ok(other) => {
                let _ = child.kill().await;
                reverse_shutdown.cancel();
                return Err(SupervisorError::WorkerStartFailed(format!(
                    "unexpected initialize response: {other:?}"
                )));
            }
            Err(e) => {
                let _ = child.kill().await;
                reverse_shutdown.cancel();
                return Err(SupervisorError::WorkerStartFailed(format!("initialize: {e}")));
            }
        }

        let handle = Arc::new(WorkerHandle::new(
            key.clone(),
            pid,
            child,
            client,
            advertised,
            reverse_path,
            reverse_shutdown,
        ));
        handle.set_health(HealthState::Ready);
        self.workers.lock().insert(key, Arc::clone(&handle));
        health::spawn_monitor(
            Arc::clone(&self.workers),
            Arc::clone(&handle),
            self.config.clone(),
        );
        Ok(handle)
    }

    /// Read stdout lines until the readiness contract line appears.
    async fn await_readiness(
        &self,
        child: &mut tokio::process::Child,
    ) -> Result<PathBuf, SupervisorError> {
        let stdout = child.stdout.take().ok_or_else(|| {
            SupervisorError::WorkerStartFailed("worker stdout not captured".to_string())
        })?;
        let mut lines = BufReader::new(stdout).lines();

        let wait = async {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(path) = parse_socket_path(&line) {
                            return Ok(path);
                        }
                        warn!(line, "unexpected worker stdout before readiness");
                    }
                    Ok(None) => {
                        return Err(SupervisorError::WorkerStartFailed(
                            "worker exited before readiness".to_string(),
                        ))
                    }
                    Err(e) => {
                        return Err(SupervisorError::WorkerStartFailed(format!(
                            "reading worker stdout: {e}"
                        )))
                    }
                }
            }
        };

        tokio::select! {
            result = wait => result,
            status = child.wait() => Err(SupervisorError::WorkerStartFailed(format!(
                "worker exited before readiness ({})",
                status.map(|s| s.to_string()).unwrap_or_else(|e| e.to_string())
            ))),
            _ = tokio::time::sleep(self.config.start_timeout) => Err(
                SupervisorError::WorkerStartFailed(format!(
                    "no readiness line within {:?}",
                    self.config.start_timeout
                )),
            ),
        }
    }

    /// Run one plugin command on a worker.
    pub async fn execute(
        &self,
        key: &WorkerKey,
        command: &str,
        payload: Vec<u8>,
        correlation_id: CorrelationId,
    ) -> Result<Vec<u8>, SupervisorError> {
        let handle = self.get(key).ok_or_else(|| SupervisorError::NotRunning(key.clone()))?;
        handle.heartbeat(SystemClock.now_ms());

        let request = ForwardRequest::Execute {
            command: command.to_string(),
            payload,
            correlation_id,
        };
        match handle.client.request(&request).await {
            Ok(ForwardResponse::Executed { result, .. }) => Ok(result),
            Ok(ForwardResponse::Error { code, message, .. }) => {
                Err(SupervisorError::Command { code, message })
            }
            Ok(other) => Err(SupervisorError::Command {
                code: ErrorCode::Internal,
                message: format!("unexpected response: {other:?}"),
            }),
            Err(e) => {
                if handle.try_wait().await.is_some() || handle.health() == HealthState::Terminated {
                    Err(SupervisorError::WorkerTerminated)
                } else {
                    Err(SupervisorError::Transport(e))
                }
            }
        }
    }

    /// Open an event stream to a worker.
    pub async fn subscribe(
        &self,
        key: &WorkerKey,
        event_types: Vec<String>,
    ) -> Result<EventSubscription, SupervisorError> {
        let handle = self.get(key).ok_or_else(|| SupervisorError::NotRunning(key.clone()))?;
        Ok(EventSubscription::open(handle.forward_path(), event_types, self.config.rpc_timeout)
            .await?)
    }

    /// Stop one worker: Shutdown RPC, grace, SIGTERM, grace, SIGKILL.
    pub async fn stop(&self, key: &WorkerKey) -> Result<(), SupervisorError> {
        let handle = self
            .workers
            .lock()
            .remove(key)
            .ok_or_else(|| SupervisorError::NotRunning(key.clone()))?;
        stop_worker(&handle, &self.config).await;
        Ok(())
    }

    /// Stop every worker; used at host shutdown.
    pub async fn stop_all(&self) {
        let handles: Vec<Arc<WorkerHandle>> =
            self.workers.lock().drain().map(|(_, handle)| handle).collect();
        for handle in handles {
            stop_worker(&handle, &self.config).await;
        }
    }
}

/// Escalating stop shared by explicit stops and the health monitor.
pub(crate) async fn stop_worker(handle: &WorkerHandle, config: &SupervisorConfig) {
    let _ = handle
        .client
        .request_with_timeout(&ForwardRequest::Shutdown, Duration::from_secs(5))
        .await;
    if !wait_exit(handle, config.shutdown_grace).await {
        warn!(key = %handle.key(), "worker ignored Shutdown, sending SIGTERM");
        handle.signal_term();
        if !wait_exit(handle, config.shutdown_grace).await {
            warn!(key = %handle.key(), "worker ignored SIGTERM, killing");
            handle.kill().await;
            wait_exit(handle, Duration::from_millis(500)).await;
        }
    }
    handle.set_health(HealthState::Terminated);
    handle.reverse_shutdown.cancel();
    let _ = std::fs::remove_file(handle.forward_path());
    let _ = std::fs::remove_file(handle.reverse_path());
    info!(key = %handle.key(), exit_code = ?handle.exit_code(), "worker stopped");
}

async fn wait_exit(handle: &WorkerHandle, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if let Some(code) = handle.try_wait().await {
            handle.record_exit(code);
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Endpoint paths under the per-user runtime directory.
fn socket_paths(runtime_dir: &Path, key: &WorkerKey) -> (PathBuf, PathBuf) {
    let instance = key.instance.as_str();
    let short_instance = &instance[..instance.len().min(8)];
    let stem = format!("ddk-{}-{}-{}", std::process::id(), key.plugin, short_instance);
    (runtime_dir.join(format!("{stem}.sock")), runtime_dir.join(format!("{stem}.token.sock")))
}

/// Parse the worker readiness contract line.
fn parse_socket_path(line: &str) -> Option<PathBuf> {
    line.trim().strip_prefix("SOCKET_PATH=").map(PathBuf::from)
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
