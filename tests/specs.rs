// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level specs: the forward/reverse RPC contracts end-to-end,
//! with the real analyzer plugin hosted by the real worker runtime.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ddk_analyzer::LayerAnalyzerPlugin;
use ddk_core::ConnectionId;
use ddk_host::token::{TokenError, TokenService};
use ddk_host::{reverse, EventSubscription, ForwardClient};
use ddk_wire::{ErrorCode, ForwardRequest, ForwardResponse};
use ddk_worker::{serve, LoadedPlugin, Worker};
use tempfile::{tempdir, TempDir};
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;

const T: Duration = Duration::from_secs(5);

struct CountingTokens {
    calls: AtomicU64,
}

#[async_trait]
impl TokenService for CountingTokens {
    async fn access_token(
        &self,
        _connection_id: &ConnectionId,
        _resource: &str,
    ) -> Result<(String, u64), TokenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(("tok".to_string(), 4_000_000_000))
    }
}

struct Stack {
    _temp: TempDir,
    client: ForwardClient,
    forward_socket: PathBuf,
    token_socket: PathBuf,
    tokens: Arc<CountingTokens>,
    worker: Arc<Worker>,
    storage: PathBuf,
}

/// Spin up a worker hosting the analyzer plus a host-side token endpoint.
async fn stack() -> Stack {
    let temp = tempdir().unwrap();
    let forward_socket = temp.path().join("fwd.sock");
    let token_socket = temp.path().join("fwd.token.sock");
    let storage = temp.path().join("storage");

    let tokens = Arc::new(CountingTokens { calls: AtomicU64::new(0) });
    let listener = reverse::bind_token_socket(&token_socket).unwrap();
    tokio::spawn(reverse::serve_token_endpoint(
        listener,
        Arc::clone(&tokens) as _,
        "c1".into(),
        CancellationToken::new(),
    ));

    let worker = Arc::new(Worker::new(
        "sla".into(),
        LoadedPlugin::in_process(Box::new(LayerAnalyzerPlugin::new())),
    ));
    let listener = UnixListener::bind(&forward_socket).unwrap();
    tokio::spawn(serve(listener, Arc::clone(&worker)));

    let client = ForwardClient::new(forward_socket.clone(), T);
    Stack { _temp: temp, client, forward_socket, token_socket, tokens, worker, storage }
}

fn initialize_request(stack: &Stack) -> ForwardRequest {
    ForwardRequest::Initialize {
        plugin_id: "sla".into(),
        storage_path: stack.storage.clone(),
        config: Default::default(),
        token_socket: stack.token_socket.clone(),
        connection_id: "c1".into(),
        connection_url: String::new(),
    }
}

async fn execute(stack: &Stack, command: &str, payload: serde_json::Value) -> serde_json::Value {
    let request = ForwardRequest::Execute {
        command: command.to_string(),
        payload: serde_json::to_vec(&payload).unwrap(),
        correlation_id: "r".into(),
    };
    match stack.client.request(&request).await.unwrap() {
        ForwardResponse::Executed { result, .. } => serde_json::from_slice(&result).unwrap(),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn happy_path_command_without_any_token_traffic() {
    let stack = stack().await;

    let response = stack.client.request(&initialize_request(&stack)).await.unwrap();
    match response {
        ForwardResponse::Initialized { plugin_name, .. } => {
            assert_eq!(plugin_name, "Solution Layer Analyzer");
        }
        other => panic!("unexpected response: {other:?}"),
    }

    let pong = execute(&stack, "ping", serde_json::json!({})).await;
    assert_eq!(pong, serde_json::json!("pong"));

    // The command never touched the remote service, so the reverse
    // channel must have seen zero token requests.
    assert_eq!(stack.tokens.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn initialize_is_accepted_at_most_once() {
    let stack = stack().await;

    let first = stack.client.request(&initialize_request(&stack)).await.unwrap();
    assert!(matches!(first, ForwardResponse::Initialized { .. }));

    let second = stack.client.request(&initialize_request(&stack)).await.unwrap();
    match second {
        ForwardResponse::Error { code, .. } => assert_eq!(code, ErrorCode::AlreadyInitialized),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn query_results_stream_back_with_their_query_id() {
    let stack = stack().await;
    stack.client.request(&initialize_request(&stack)).await.unwrap();

    let mut subscription =
        EventSubscription::open(&stack.forward_socket, Vec::new(), T).await.unwrap();

    let ack = execute(
        &stack,
        "query",
        serde_json::json!({ "queryId": "q42", "useEventResponse": true }),
    )
    .await;
    assert_eq!(ack, serde_json::json!({ "queryId": "q42", "started": true }));

    let event = subscription.next_event(T).await.unwrap().expect("stream open");
    assert_eq!(event.event_type, "plugin:sla:query-result");
    assert_eq!(event.payload["queryId"], "q42");
    assert_eq!(event.payload["success"], true);
}

#[tokio::test]
async fn shutdown_acknowledges_then_exits_the_serve_loop() {
    let stack = stack().await;
    stack.client.request(&initialize_request(&stack)).await.unwrap();

    let response = stack.client.request(&ForwardRequest::Shutdown).await.unwrap();
    assert!(matches!(response, ForwardResponse::ShuttingDown));

    tokio::time::timeout(T, stack.worker.shutdown_token().cancelled())
        .await
        .expect("worker should schedule its exit");
}

#[tokio::test]
async fn unknown_commands_carry_their_error_code() {
    let stack = stack().await;
    stack.client.request(&initialize_request(&stack)).await.unwrap();

    let request = ForwardRequest::Execute {
        command: "frobnicate".to_string(),
        payload: b"{}".to_vec(),
        correlation_id: "r9".into(),
    };
    match stack.client.request(&request).await.unwrap() {
        ForwardResponse::Error { code, correlation_id, .. } => {
            assert_eq!(code, ErrorCode::CommandUnknown);
            assert_eq!(correlation_id.unwrap().as_str(), "r9");
        }
        other => panic!("unexpected response: {other:?}"),
    }
}
