// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor tests against a scripted worker process.
//!
//! The "worker binary" is a shell script that prints the readiness line
//! pointing at an in-process forward RPC server (the real worker runtime
//! from `ddk-worker`), then sleeps. This exercises spawn, readiness,
//! initialize, execute, and the stop escalation without building plugins.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ddk_core::{
    BackendManifest, CommandDescriptor, Connection, ConnectionId, InstanceId, PluginManifest,
};
use ddk_sdk::{Plugin, PluginContext, PluginError};
use ddk_worker::{serve as worker_serve, LoadedPlugin, Worker};
use tempfile::{tempdir, TempDir};
use tokio::net::UnixListener;

use super::*;
use crate::token::{TokenError, TokenService};

struct StubTokens;

#[async_trait]
impl TokenService for StubTokens {
    async fn access_token(
        &self,
        _connection_id: &ConnectionId,
        _resource: &str,
    ) -> Result<(String, u64), TokenError> {
        Ok(("tok".to_string(), 4_000_000_000))
    }
}

struct PingPlugin;

#[async_trait]
impl Plugin for PingPlugin {
    fn plugin_id(&self) -> &str {
        "ping"
    }

    fn name(&self) -> &str {
        "Ping"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    async fn initialize(&self, _ctx: Arc<dyn PluginContext>) -> Result<(), PluginError> {
        Ok(())
    }

    fn commands(&self) -> Vec<CommandDescriptor> {
        vec![CommandDescriptor::new("ping", "Ping")]
    }

    async fn execute(&self, command: &str, _payload: &[u8]) -> Result<Vec<u8>, PluginError> {
        match command {
            "ping" => Ok(b"pong".to_vec()),
            other => Err(PluginError::UnknownCommand(other.to_string())),
        }
    }

    async fn dispose(&self) {}
}

struct Fixture {
    _temp: TempDir,
    supervisor: WorkerSupervisor,
    plugin: DiscoveredPlugin,
    connection: Connection,
}

/// Write the fake worker script: advertise `socket`, then sleep.
fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-worker.sh");
    std::fs::write(&path, body).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

fn fixture_with(script_body: &str, start_timeout: Duration) -> Fixture {
    let temp = tempdir().unwrap();
    let script = write_script(temp.path(), script_body);

    let config = SupervisorConfig {
        worker_binary: script.clone(),
        runtime_dir: temp.path().join("run"),
        storage_root: temp.path().join("storage"),
        start_timeout,
        rpc_timeout: Duration::from_secs(5),
        health_interval: Duration::from_secs(60),
        health_ping_timeout: Duration::from_secs(1),
        health_strikes: 3,
        shutdown_grace: Duration::from_millis(300),
    };
    let supervisor = WorkerSupervisor::new(config, Arc::new(StubTokens));

    let manifest = PluginManifest {
        id: "ping".into(),
        name: "Ping".to_string(),
        version: "1.0.0".to_string(),
        description: String::new(),
        backend: BackendManifest { assembly: script, entry_point: "ddk_plugin_entry".to_string() },
        ui: None,
    };
    let plugin = DiscoveredPlugin { manifest, manifest_path: temp.path().join("manifest.json") };
    let connection = Connection::new("c1", "Dev", "https://org.example.test");
    Fixture { _temp: temp, supervisor, plugin, connection }
}

/// Fixture whose script advertises an in-process worker server.
async fn ready_fixture() -> Fixture {
    let temp = tempdir().unwrap();
    let fake_socket = temp.path().join("fake.sock");

    let listener = UnixListener::bind(&fake_socket).unwrap();
    let worker =
        Arc::new(Worker::new("ping".into(), LoadedPlugin::in_process(Box::new(PingPlugin))));
    tokio::spawn(worker_serve(listener, worker));

    let body =
        format!("#!/bin/sh\necho \"SOCKET_PATH={}\"\nexec sleep 300\n", fake_socket.display());
    let script = write_script(temp.path(), &body);

    let config = SupervisorConfig {
        worker_binary: script.clone(),
        runtime_dir: temp.path().join("run"),
        storage_root: temp.path().join("storage"),
        start_timeout: Duration::from_secs(5),
        rpc_timeout: Duration::from_secs(5),
        health_interval: Duration::from_secs(60),
        health_ping_timeout: Duration::from_secs(1),
        health_strikes: 3,
        shutdown_grace: Duration::from_millis(300),
    };
    let supervisor = WorkerSupervisor::new(config, Arc::new(StubTokens));
    let manifest = PluginManifest {
        id: "ping".into(),
        name: "Ping".to_string(),
        version: "1.0.0".to_string(),
        description: String::new(),
        backend: BackendManifest { assembly: script, entry_point: "ddk_plugin_entry".to_string() },
        ui: None,
    };
    let plugin = DiscoveredPlugin { manifest, manifest_path: temp.path().join("manifest.json") };
    let connection = Connection::new("c1", "Dev", "https://org.example.test");
    Fixture { _temp: temp, supervisor, plugin, connection }
}

#[tokio::test]
async fn start_initializes_and_executes() {
    let f = ready_fixture().await;
    let instance = InstanceId::new("tab-1");

    let handle = f.supervisor.start(&f.plugin, &instance, &f.connection).await.unwrap();
    assert_eq!(handle.health(), HealthState::Ready);

    let key = WorkerKey::new("ping", "tab-1");
    let result = f
        .supervisor
        .execute(&key, "ping", Vec::new(), CorrelationId::new("r1"))
        .await
        .unwrap();
    assert_eq!(result, b"pong");
}

#[tokio::test]
async fn ensure_started_reuses_a_ready_worker() {
    let f = ready_fixture().await;
    let instance = InstanceId::new("tab-1");

    let first = f.supervisor.ensure_started(&f.plugin, &instance, &f.connection).await.unwrap();
    let second = f.supervisor.ensure_started(&f.plugin, &instance, &f.connection).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(f.supervisor.list().len(), 1);
}

#[tokio::test]
async fn unknown_commands_surface_their_error_code() {
    let f = ready_fixture().await;
    let instance = InstanceId::new("tab-1");
    f.supervisor.start(&f.plugin, &instance, &f.connection).await.unwrap();

    let key = WorkerKey::new("ping", "tab-1");
    let err = f
        .supervisor
        .execute(&key, "frobnicate", Vec::new(), CorrelationId::new("r2"))
        .await
        .unwrap_err();
    match err {
        SupervisorError::Command { code, .. } => assert_eq!(code, ErrorCode::CommandUnknown),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn stop_escalates_and_records_termination() {
    let f = ready_fixture().await;
    let instance = InstanceId::new("tab-1");
    let handle = f.supervisor.start(&f.plugin, &instance, &f.connection).await.unwrap();

    let key = WorkerKey::new("ping", "tab-1");
    f.supervisor.stop(&key).await.unwrap();

    assert_eq!(handle.health(), HealthState::Terminated);
    assert!(f.supervisor.get(&key).is_none());
}

#[tokio::test]
async fn missing_readiness_line_fails_within_the_timeout() {
    let f = fixture_with("#!/bin/sh\nexec sleep 300\n", Duration::from_millis(200));
    let instance = InstanceId::new("tab-1");

    let err = f.supervisor.start(&f.plugin, &instance, &f.connection).await.unwrap_err();
    assert!(matches!(err, SupervisorError::WorkerStartFailed(_)), "got: {err:?}");
}

#[tokio::test]
async fn readiness_after_the_deadline_fails() {
    // The line arrives, but later than the configured start timeout.
    let f = fixture_with(
        "#!/bin/sh\nsleep 0.4\necho \"SOCKET_PATH=/tmp/never-used.sock\"\nexec sleep 300\n",
        Duration::from_millis(100),
    );
    let instance = InstanceId::new("tab-1");

    let err = f.supervisor.start(&f.plugin, &instance, &f.connection).await.unwrap_err();
    assert!(matches!(err, SupervisorError::WorkerStartFailed(_)));
}

#[tokio::test]
async fn worker_exit_before_readiness_is_start_failure() {
    let f = fixture_with("#!/bin/sh\nexit 3\n", Duration::from_secs(5));
    let instance = InstanceId::new("tab-1");

    let err = f.supervisor.start(&f.plugin, &instance, &f.connection).await.unwrap_err();
    match err {
        SupervisorError::WorkerStartFailed(message) => {
            assert!(message.contains("exited"), "message: {message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn execute_without_a_worker_is_not_running() {
    let f = fixture_with("#!/bin/sh\nexit 0\n", Duration::from_secs(1));
    let key = WorkerKey::new("ping", "never-started");

    let err = f
        .supervisor
        .execute(&key, "ping", Vec::new(), CorrelationId::new("r3"))
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::NotRunning(_)));
}

#[test]
fn readiness_line_parsing() {
    assert_eq!(
        parse_socket_path("SOCKET_PATH=/tmp/ddk-1-sla.sock"),
        Some(PathBuf::from("/tmp/ddk-1-sla.sock"))
    );
    assert_eq!(
        parse_socket_path("  SOCKET_PATH=/tmp/x.sock\n"),
        Some(PathBuf::from("/tmp/x.sock"))
    );
    assert_eq!(parse_socket_path("starting up"), None);
}

#[test]
fn socket_paths_are_distinct_per_worker() {
    let key_a = WorkerKey::new("sla", "aaaaaaaa-1111");
    let key_b = WorkerKey::new("sla", "bbbbbbbb-2222");
    let dir = Path::new("/tmp/run");

    let (fwd_a, rev_a) = socket_paths(dir, &key_a);
    let (fwd_b, _) = socket_paths(dir, &key_b);
    assert_ne!(fwd_a, fwd_b);
    assert!(rev_a.to_string_lossy().ends_with(".token.sock"));
}
