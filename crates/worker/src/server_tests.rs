// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ddk_core::{CommandDescriptor, CorrelationId, PluginEvent};
use ddk_sdk::{Plugin, PluginContext, PluginError};
use ddk_wire::{read_frame, write_frame, write_message, ErrorCode, ForwardRequest, ForwardResponse};
use parking_lot::Mutex;
use tempfile::{tempdir, TempDir};
use tokio::net::{UnixListener, UnixStream};

use super::*;
use crate::loader::LoadedPlugin;

const T: Duration = Duration::from_secs(5);

/// Test plugin: echoes payloads, emits numbered events, fails on demand.
#[derive(Default)]
struct EchoPlugin {
    ctx: Mutex<Option<Arc<dyn PluginContext>>>,
}

#[async_trait]
impl Plugin for EchoPlugin {
    fn plugin_id(&self) -> &str {
        "echo"
    }

    fn name(&self) -> &str {
        "Echo"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    async fn initialize(&self, ctx: Arc<dyn PluginContext>) -> Result<(), PluginError> {
        *self.ctx.lock() = Some(ctx);
        Ok(())
    }

    fn commands(&self) -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::new("ping", "Ping"),
            CommandDescriptor::new("emit", "Emit events"),
            CommandDescriptor::new("boom", "Always fails"),
        ]
    }

    async fn execute(&self, command: &str, payload: &[u8]) -> Result<Vec<u8>, PluginError> {
        match command {
            "ping" => Ok(payload.to_vec()),
            "emit" => {
                let count = payload.first().copied().unwrap_or(0);
                let ctx = self.ctx.lock().clone().ok_or(PluginError::NotInitialized)?;
                for n in 0..count {
                    ctx.emit_event(PluginEvent::new(
                        "echo",
                        "echo:test",
                        serde_json::json!({ "n": n }),
                        u64::from(n),
                    ));
                }
                Ok(Vec::new())
            }
            "boom" => Err(PluginError::CommandFailed("kaboom".to_string())),
            other => Err(PluginError::UnknownCommand(other.to_string())),
        }
    }

    async fn dispose(&self) {}
}

struct Harness {
    _temp: TempDir,
    worker: Arc<Worker>,
    socket: PathBuf,
    storage: PathBuf,
}

async fn start() -> Harness {
    let temp = tempdir().unwrap();
    let socket = temp.path().join("fwd.sock");
    let storage = temp.path().join("storage");
    let listener = UnixListener::bind(&socket).unwrap();
    let worker = Arc::new(Worker::new(
        "echo".into(),
        LoadedPlugin::in_process(Box::new(EchoPlugin::default())),
    ));
    tokio::spawn(serve(listener, Arc::clone(&worker)));
    Harness { _temp: temp, worker, socket, storage }
}

async fn call(stream: &mut UnixStream, request: &ForwardRequest) -> ForwardResponse {
    write_frame(stream, request, T).await.unwrap();
    read_frame(stream, T).await.unwrap()
}

fn initialize_request(storage: &Path) -> ForwardRequest {
    ForwardRequest::Initialize {
        plugin_id: "echo".into(),
        storage_path: storage.to_path_buf(),
        config: HashMap::new(),
        token_socket: storage.join("token.sock"),
        connection_id: "c1".into(),
        connection_url: "https://org.example.test".to_string(),
    }
}

async fn initialized_harness() -> (Harness, UnixStream) {
    let harness = start().await;
    let mut stream = UnixStream::connect(&harness.socket).await.unwrap();
    let response = call(&mut stream, &initialize_request(&harness.storage)).await;
    assert!(matches!(response, ForwardResponse::Initialized { .. }), "init failed: {response:?}");
    (harness, stream)
}

#[tokio::test]
async fn initialize_reports_name_and_version() {
    let harness = start().await;
    let mut stream = UnixStream::connect(&harness.socket).await.unwrap();

    match call(&mut stream, &initialize_request(&harness.storage)).await {
        ForwardResponse::Initialized { plugin_name, plugin_version } => {
            assert_eq!(plugin_name, "Echo");
            assert_eq!(plugin_version, "1.0.0");
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn second_initialize_fails_already_initialized() {
    let (harness, mut stream) = initialized_harness().await;

    match call(&mut stream, &initialize_request(&harness.storage)).await {
        ForwardResponse::Error { code, .. } => assert_eq!(code, ErrorCode::AlreadyInitialized),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn get_commands_works_without_initialize() {
    let harness = start().await;
    let mut stream = UnixStream::connect(&harness.socket).await.unwrap();

    match call(&mut stream, &ForwardRequest::GetCommands).await {
        ForwardResponse::Commands { commands } => {
            let names: Vec<&str> = commands.iter().map(|c| c.name.as_str()).collect();
            assert_eq!(names, vec!["ping", "emit", "boom"]);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn execute_echoes_payload_and_correlation() {
    let (_harness, mut stream) = initialized_harness().await;

    let request = ForwardRequest::Execute {
        command: "ping".to_string(),
        payload: b"{}".to_vec(),
        correlation_id: CorrelationId::new("r7"),
    };
    match call(&mut stream, &request).await {
        ForwardResponse::Executed { result, correlation_id } => {
            assert_eq!(result, b"{}");
            assert_eq!(correlation_id, CorrelationId::new("r7"));
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn execute_before_initialize_is_rejected() {
    let harness = start().await;
    let mut stream = UnixStream::connect(&harness.socket).await.unwrap();

    let request = ForwardRequest::Execute {
        command: "ping".to_string(),
        payload: Vec::new(),
        correlation_id: CorrelationId::new("r1"),
    };
    match call(&mut stream, &request).await {
        ForwardResponse::Error { code, correlation_id, .. } => {
            assert_eq!(code, ErrorCode::PluginNotLoaded);
            assert_eq!(correlation_id, Some(CorrelationId::new("r1")));
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn unknown_command_maps_to_command_unknown() {
    let (_harness, mut stream) = initialized_harness().await;

    let request = ForwardRequest::Execute {
        command: "frobnicate".to_string(),
        payload: Vec::new(),
        correlation_id: CorrelationId::new("r2"),
    };
    match call(&mut stream, &request).await {
        ForwardResponse::Error { code, .. } => assert_eq!(code, ErrorCode::CommandUnknown),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn failing_command_maps_to_command_failed() {
    let (_harness, mut stream) = initialized_harness().await;

    let request = ForwardRequest::Execute {
        command: "boom".to_string(),
        payload: Vec::new(),
        correlation_id: CorrelationId::new("r3"),
    };
    match call(&mut stream, &request).await {
        ForwardResponse::Error { code, message, .. } => {
            assert_eq!(code, ErrorCode::CommandFailed);
            assert!(message.contains("kaboom"));
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn unknown_method_frame_yields_unknown_method() {
    let harness = start().await;
    let mut stream = UnixStream::connect(&harness.socket).await.unwrap();

    write_message(&mut stream, br#"{"type":"Reboot"}"#).await.unwrap();
    let response: ForwardResponse = read_frame(&mut stream, T).await.unwrap();
    match response {
        ForwardResponse::Error { code, .. } => assert_eq!(code, ErrorCode::UnknownMethod),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn events_emitted_before_subscribe_are_delivered_in_order() {
    let (_harness, mut stream) = initialized_harness().await;

    // Emit 3 events, then subscribe on a second connection
    let request = ForwardRequest::Execute {
        command: "emit".to_string(),
        payload: vec![3],
        correlation_id: CorrelationId::new("r4"),
    };
    assert!(matches!(call(&mut stream, &request).await, ForwardResponse::Executed { .. }));

    let mut sub = UnixStream::connect(&_harness.socket).await.unwrap();
    write_frame(&mut sub, &ForwardRequest::SubscribeEvents { event_types: Vec::new() }, T)
        .await
        .unwrap();
    let first: ForwardResponse = read_frame(&mut sub, T).await.unwrap();
    assert!(matches!(first, ForwardResponse::Subscribed));

    for expected in 0..3u64 {
        match read_frame::<_, ForwardResponse>(&mut sub, T).await.unwrap() {
            ForwardResponse::Event { event } => assert_eq!(event.timestamp_ms, expected),
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn event_stream_filters_by_type() {
    let (harness, mut stream) = initialized_harness().await;

    let mut sub = UnixStream::connect(&harness.socket).await.unwrap();
    write_frame(
        &mut sub,
        &ForwardRequest::SubscribeEvents { event_types: vec!["other:type".to_string()] },
        T,
    )
    .await
    .unwrap();
    let _subscribed: ForwardResponse = read_frame(&mut sub, T).await.unwrap();

    // Emitted events are `echo:test`, which the filter excludes
    let request = ForwardRequest::Execute {
        command: "emit".to_string(),
        payload: vec![2],
        correlation_id: CorrelationId::new("r5"),
    };
    assert!(matches!(call(&mut stream, &request).await, ForwardResponse::Executed { .. }));

    let read = read_frame::<_, ForwardResponse>(&mut sub, Duration::from_millis(100)).await;
    assert!(read.is_err(), "filtered event should not be delivered");
}

#[tokio::test]
async fn execute_works_while_a_subscription_is_live() {
    let (harness, mut stream) = initialized_harness().await;

    let mut sub = UnixStream::connect(&harness.socket).await.unwrap();
    write_frame(&mut sub, &ForwardRequest::SubscribeEvents { event_types: Vec::new() }, T)
        .await
        .unwrap();
    let _subscribed: ForwardResponse = read_frame(&mut sub, T).await.unwrap();

    let request = ForwardRequest::Execute {
        command: "emit".to_string(),
        payload: vec![1],
        correlation_id: CorrelationId::new("r6"),
    };
    assert!(matches!(call(&mut stream, &request).await, ForwardResponse::Executed { .. }));

    match read_frame::<_, ForwardResponse>(&mut sub, T).await.unwrap() {
        ForwardResponse::Event { event } => assert_eq!(event.event_type, "echo:test"),
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[tokio::test]
async fn shutdown_acknowledges_then_cancels() {
    let (harness, mut stream) = initialized_harness().await;

    let response = call(&mut stream, &ForwardRequest::Shutdown).await;
    assert!(matches!(response, ForwardResponse::ShuttingDown));

    tokio::time::timeout(T, harness.worker.shutdown_token().cancelled())
        .await
        .expect("shutdown token should fire");
}
