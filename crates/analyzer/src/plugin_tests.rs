// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ddk_sdk::{ClientError, ClientFactory, ClientMultiplexer, ContextError, TokenSource};
use tempfile::tempdir;

use super::*;

struct NoTokens;

#[async_trait]
impl TokenSource for NoTokens {
    async fn access_token(&self, _resource: &str) -> Result<String, ClientError> {
        Err(ClientError::Token("offline".to_string()))
    }
}

/// In-memory plugin context for driving the plugin without a worker.
struct TestContext {
    storage: PathBuf,
    events: Mutex<Vec<PluginEvent>>,
    config: Mutex<HashMap<String, String>>,
    factory: Arc<ClientFactory>,
}

impl TestContext {
    fn new(storage: PathBuf) -> Self {
        std::fs::create_dir_all(&storage).unwrap();
        Self {
            storage,
            events: Mutex::new(Vec::new()),
            config: Mutex::new(HashMap::new()),
            factory: Arc::new(ClientFactory::new(
                "c1".into(),
                Arc::new(NoTokens),
                Arc::new(ClientMultiplexer::new(2)),
            )),
        }
    }
}

impl PluginContext for TestContext {
    fn storage_path(&self) -> &Path {
        &self.storage
    }

    fn connection_url(&self) -> &str {
        ""
    }

    fn span(&self) -> tracing::Span {
        tracing::Span::none()
    }

    fn emit_event(&self, event: PluginEvent) {
        self.events.lock().push(event);
    }

    fn get_config(&self, key: &str) -> Option<String> {
        self.config.lock().get(key).cloned()
    }

    fn set_config(&self, key: &str, value: &str) -> Result<(), ContextError> {
        self.config.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn client_factory(&self) -> Arc<ClientFactory> {
        Arc::clone(&self.factory)
    }
}

struct Fixture {
    _temp: tempfile::TempDir,
    plugin: LayerAnalyzerPlugin,
    ctx: Arc<TestContext>,
}

async fn fixture() -> Fixture {
    let temp = tempdir().unwrap();
    let ctx = Arc::new(TestContext::new(temp.path().join("storage")));
    let plugin = LayerAnalyzerPlugin::new();
    plugin.initialize(Arc::clone(&ctx) as Arc<dyn PluginContext>).await.unwrap();
    Fixture { _temp: temp, plugin, ctx }
}

async fn run(fixture: &Fixture, command: &str, payload: serde_json::Value) -> serde_json::Value {
    let bytes = fixture
        .plugin
        .execute(command, &serde_json::to_vec(&payload).unwrap())
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn ping_answers_pong() {
    let f = fixture().await;
    assert_eq!(run(&f, "ping", serde_json::json!({})).await, serde_json::json!("pong"));
}

#[tokio::test]
async fn commands_cover_the_public_surface() {
    let plugin = LayerAnalyzerPlugin::new();
    let names: Vec<String> = plugin.commands().into_iter().map(|c| c.name).collect();
    assert_eq!(
        names,
        vec![
            "ping",
            "start-index",
            "cancel-index",
            "index-metadata",
            "query",
            "diff",
            "clear-index"
        ]
    );
}

#[tokio::test]
async fn execute_before_initialize_is_rejected() {
    let plugin = LayerAnalyzerPlugin::new();
    let err = plugin.execute("ping", b"{}").await.unwrap_err();
    assert!(matches!(err, PluginError::NotInitialized));
}

#[tokio::test]
async fn unknown_command_is_rejected() {
    let f = fixture().await;
    let err = f.plugin.execute("frobnicate", b"{}").await.unwrap_err();
    assert!(matches!(err, PluginError::UnknownCommand(_)));
}

#[tokio::test]
async fn malformed_payload_is_a_command_failure() {
    let f = fixture().await;
    let err = f.plugin.execute("query", b"not json").await.unwrap_err();
    match err {
        PluginError::CommandFailed(message) => assert!(message.contains("invalid payload")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn empty_store_reports_no_index() {
    let f = fixture().await;
    let metadata = run(&f, "index-metadata", serde_json::json!({})).await;
    assert_eq!(metadata["hasIndex"], false);
}

#[tokio::test]
async fn sync_query_on_an_empty_store_is_empty() {
    let f = fixture().await;
    let response = run(&f, "query", serde_json::json!({ "queryId": "q0" })).await;
    assert_eq!(response["total"], 0);
    assert_eq!(response["queryId"], "q0");
}

#[tokio::test]
async fn event_queries_correlate_by_query_id() {
    let f = fixture().await;

    // Two event-mode queries in flight; each result must echo its own id
    let ack1 =
        run(&f, "query", serde_json::json!({ "queryId": "q1", "useEventResponse": true })).await;
    let ack2 =
        run(&f, "query", serde_json::json!({ "queryId": "q2", "useEventResponse": true })).await;
    assert_eq!(ack1, serde_json::json!({ "queryId": "q1", "started": true }));
    assert_eq!(ack2, serde_json::json!({ "queryId": "q2", "started": true }));

    // Wait for both completion events
    let mut seen = Vec::new();
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        seen = f
            .ctx
            .events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type::QUERY_RESULT)
            .map(|e| e.payload["queryId"].as_str().unwrap().to_string())
            .collect();
        if seen.len() == 2 {
            break;
        }
    }
    seen.sort();
    assert_eq!(seen, vec!["q1", "q2"]);
}

#[tokio::test]
async fn start_index_without_an_environment_fails_via_completion_event() {
    let f = fixture().await;
    let ack = run(
        &f,
        "start-index",
        serde_json::json!({ "sourceSolutions": ["Core"], "targetSolutions": ["ProjA"] }),
    )
    .await;
    assert_eq!(ack["started"], true);

    let mut completion = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        completion = f
            .ctx
            .events
            .lock()
            .iter()
            .find(|e| e.event_type == event_type::INDEX_COMPLETE)
            .cloned();
        if completion.is_some() {
            break;
        }
    }
    let completion = completion.expect("completion event");
    assert_eq!(completion.payload["success"], false);
    assert!(completion.payload["errorMessage"]
        .as_str()
        .unwrap()
        .contains("no remote environment"));
}

#[tokio::test]
async fn clear_index_empties_the_store() {
    let f = fixture().await;
    let response = run(&f, "clear-index", serde_json::json!({})).await;
    assert_eq!(response["cleared"], true);
}
